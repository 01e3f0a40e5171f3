//! AppState: read-only data handed to every component during render/event.
//!
//! Only the App event loop writes to it.

use radiola_core::protocol::{PlayerState, Song, Station};

use crate::action::Overlay;
use crate::plugin::PluginEntry;

/// One row of the plugins dialog.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginRow {
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub error: Option<String>,
    pub has_preferences: bool,
}

impl PluginRow {
    pub fn from_entry(entry: &PluginEntry) -> Self {
        Self {
            name: entry.name().to_string(),
            description: entry.description().to_string(),
            enabled: entry.is_enabled(),
            error: entry.error().map(ToString::to_string),
            has_preferences: entry.preferences().is_some(),
        }
    }
}

#[derive(Default)]
pub struct AppState {
    pub player: PlayerState,
    pub overlay: Overlay,
    pub show_logs: bool,
    /// WARN/ERROR lines from the tracing layer, newest last.
    pub logs: Vec<String>,
    pub plugins: Vec<PluginRow>,
}

const MAX_LOG_LINES: usize = 500;

impl AppState {
    pub fn current_station(&self) -> Option<&Station> {
        let id = self.player.current_station.as_deref()?;
        self.player.stations.iter().find(|s| s.id == id)
    }

    /// Station the stream actually comes from (a QuickMix member while on
    /// QuickMix).
    pub fn playing_station(&self) -> Option<&Station> {
        let id = self.player.playing_station.as_deref()?;
        self.player.stations.iter().find(|s| s.id == id)
    }

    pub fn current_song(&self) -> Option<&Song> {
        self.player.current_song.as_ref()
    }

    pub fn push_log(&mut self, line: String) {
        self.logs.push(line);
        if self.logs.len() > MAX_LOG_LINES {
            let excess = self.logs.len() - MAX_LOG_LINES;
            self.logs.drain(..excess);
        }
    }
}
