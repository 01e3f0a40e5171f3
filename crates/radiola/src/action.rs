//! Action enum: user intents and internal events produced by components.

use radiola_core::protocol::Station;

use crate::plugin::PrefValue;

/// Unique identifier for a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentId {
    NowPlaying,
    History,
    LogPanel,
    StationsPopover,
    SearchDialog,
    PluginsDialog,
    PreferencesDialog,
    HelpOverlay,
}

/// Modal overlays drawn above the main window.  At most one is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overlay {
    #[default]
    None,
    Stations,
    Search,
    Plugins,
    Preferences,
    Help,
}

/// Components produce Actions; the App dispatches them.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // ── Playback ─────────────────────────────────────────────────────────────
    PlayPause,
    Next,
    Love,
    Ban,
    Tired,
    Unrate,
    /// Linear 0..1.
    Volume(f64),
    PlayStation(String),
    AddStation(Station),

    // ── Overlays ─────────────────────────────────────────────────────────────
    Open(Overlay),
    CloseOverlay,
    OpenPreferences(String),

    // ── Plugins ──────────────────────────────────────────────────────────────
    TogglePlugin(String),
    SetPreference {
        plugin: String,
        key: String,
        value: PrefValue,
    },
    ResetPreferences(String),

    // ── Search ───────────────────────────────────────────────────────────────
    Search { generation: u64, query: String },
    SearchTag { generation: u64, tag: String },

    // ── UI toggles ───────────────────────────────────────────────────────────
    ToggleLogs,
    CopyToClipboard(String),
    Toast(String),

    // ── Window ───────────────────────────────────────────────────────────────
    /// Close button: hides or quits depending on plugins.
    Close,
    Quit,
    Noop,
}
