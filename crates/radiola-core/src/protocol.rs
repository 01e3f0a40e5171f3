use serde::{Deserialize, Serialize};

/// Stable id of the virtual QuickMix station.
pub const QUICKMIX_ID: &str = "quickmix";

/// Commands posted to the playback core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "cmd")]
pub enum Command {
    PlayStation { id: String },
    Play,
    Pause,
    PlayPause,
    Stop,
    Next,
    Volume { value: f64 },
    Rate { rating: Rating },
    Tired,
    Unrate,
    AddStation { station: Station },
    SetSongArt { index: u64, url: String },
}

/// Detailed playback status as observed from mpv
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle, // nothing loaded / explicitly stopped
    Connecting, // loadfile sent, mpv buffering/connecting
    Playing,    // core-idle=false, audio flowing
    Paused,     // explicitly paused
    Error,      // failed to play (timeout or mpv error)
}

impl PlaybackStatus {
    /// Value of the MPRIS `PlaybackStatus` property.
    pub fn mpris_label(self) -> &'static str {
        match self {
            PlaybackStatus::Playing => "Playing",
            PlaybackStatus::Paused => "Paused",
            _ => "Stopped",
        }
    }
}

/// Health of the mpv process as observed by the playback core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum MpvHealth {
    #[default]
    Absent,
    Starting,
    Running,
    Degraded(String),
    Dead,
    Restarting,
}

impl MpvHealth {
    /// Short label for the status bar (≤5 chars).
    pub fn badge_label(&self) -> Option<&str> {
        match self {
            MpvHealth::Absent | MpvHealth::Running => None,
            MpvHealth::Starting => Some("INIT"),
            MpvHealth::Degraded(_) => Some("DEGD"),
            MpvHealth::Dead => Some("DEAD"),
            MpvHealth::Restarting => Some("REST"),
        }
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(
            self,
            MpvHealth::Degraded(_) | MpvHealth::Dead | MpvHealth::Restarting
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Love,
    Ban,
}

impl Rating {
    pub fn as_str(self) -> &'static str {
        match self {
            Rating::Love => "love",
            Rating::Ban => "ban",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Station {
    /// Stable identifier, safe inside a D-Bus object path.
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    /// Searchable tags (genre, style, language, etc.)
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub is_quick_mix: bool,
    /// Member of the QuickMix rotation.
    #[serde(default)]
    pub use_quick_mix: bool,
    /// Stream needs the account credentials (HTTP basic auth).
    #[serde(default)]
    pub requires_auth: bool,
}

impl Station {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let name = name.into();
        let url = url.into();
        Self {
            id: station_id(&name, &url),
            name,
            url,
            ..Self::default()
        }
    }

    pub fn quick_mix() -> Self {
        Self {
            id: QUICKMIX_ID.to_string(),
            name: "QuickMix".to_string(),
            is_quick_mix: true,
            ..Self::default()
        }
    }
}

/// FNV-1a over `name` and `url`, rendered as 16 hex chars.
pub fn station_id(name: &str, url: &str) -> String {
    format!("{:016x}", fnv1a(&[name.as_bytes(), b"\0", url.as_bytes()]))
}

pub(crate) fn fnv1a(parts: &[&[u8]]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for part in parts {
        for byte in part.iter() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(PRIME);
        }
    }
    hash
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Song {
    /// Monotonic per-session counter.
    pub index: u64,
    /// 16 hex chars, unique per song, usable in a D-Bus object path.
    pub track_token: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub rating: Option<Rating>,
    #[serde(default)]
    pub tired: bool,
    pub art_url: Option<String>,
    pub audio_url: String,
    pub detail_url: Option<String>,
    pub station_id: String,
    pub started_at: chrono::DateTime<chrono::Local>,
    pub length_secs: Option<f64>,
}

impl Song {
    pub fn is_loved(&self) -> bool {
        self.rating == Some(Rating::Love)
    }

    pub fn is_banned(&self) -> bool {
        self.rating == Some(Rating::Ban)
    }

    /// "artist - title", or just the title when the artist is unknown.
    pub fn display(&self) -> String {
        if self.artist.is_empty() {
            self.title.clone()
        } else {
            format!("{} - {}", self.artist, self.title)
        }
    }
}

/// Snapshot of the player.  `rev` is bumped on every change.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlayerState {
    #[serde(default)]
    pub rev: u64,
    pub stations: Vec<Station>,
    pub current_station: Option<String>,
    /// Concrete station streaming right now (differs from `current_station`
    /// while QuickMix is selected).
    pub playing_station: Option<String>,
    pub current_song: Option<Song>,
    /// Oldest first, bounded.
    pub history: Vec<Song>,
    /// Linear 0..1.
    pub volume: f64,
    pub playback_status: PlaybackStatus,
    pub time_pos_secs: Option<f64>,
    #[serde(default)]
    pub mpv_health: MpvHealth,
}

impl PlayerState {
    pub fn station(&self, id: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == id)
    }

    pub fn current_station(&self) -> Option<&Station> {
        self.current_station.as_deref().and_then(|id| self.station(id))
    }

    pub fn playing_station(&self) -> Option<&Station> {
        self.playing_station.as_deref().and_then(|id| self.station(id))
    }

    pub fn is_playing(&self) -> bool {
        self.playback_status == PlaybackStatus::Playing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn station_id_is_stable_and_path_safe() {
        let a = station_id("Radio One", "http://example.com/one");
        let b = station_id("Radio One", "http://example.com/one");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, station_id("Radio One", "http://example.com/two"));
    }

    #[test]
    fn mpris_status_labels() {
        assert_eq!(PlaybackStatus::Playing.mpris_label(), "Playing");
        assert_eq!(PlaybackStatus::Paused.mpris_label(), "Paused");
        assert_eq!(PlaybackStatus::Connecting.mpris_label(), "Stopped");
        assert_eq!(PlaybackStatus::Idle.mpris_label(), "Stopped");
    }

    #[test]
    fn command_serializes_with_tag() {
        let json = serde_json::to_string(&Command::Rate { rating: Rating::Love }).unwrap();
        assert_eq!(json, r#"{"cmd":"Rate","rating":"love"}"#);
    }

    #[test]
    fn song_display() {
        let mut song = Song {
            title: "Hey Jude".into(),
            ..Song::default()
        };
        assert_eq!(song.display(), "Hey Jude");
        song.artist = "The Beatles".into();
        assert_eq!(song.display(), "The Beatles - Hey Jude");
    }
}
