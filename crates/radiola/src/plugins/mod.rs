//! Built-in plugins.

pub mod find_missing_covers;
pub mod hide_on_close;
pub mod journald_logging;
pub mod mpris;
pub mod notify;

use crate::plugin::PluginFactory;

/// Name and constructor of every built-in plugin, in load order.
pub fn builtin() -> Vec<(&'static str, PluginFactory)> {
    vec![
        ("journald_logging", journald_logging::JournaldLogging::create as PluginFactory),
        ("mpris", mpris::MprisPlugin::create as PluginFactory),
        ("notify", notify::NotifyPlugin::create as PluginFactory),
        ("find_missing_covers", find_missing_covers::FindMissingCovers::create as PluginFactory),
        ("hide_on_close", hide_on_close::HideOnClose::create as PluginFactory),
    ]
}
