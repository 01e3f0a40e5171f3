//! Songs from stream metadata, and the ratings store.
//!
//! Live streams only carry an ICY `StreamTitle`, so a song is whatever the
//! station announces.  Ratings are remembered per artist + title and
//! re-applied when the same song comes around again.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::protocol::{fnv1a, Rating, Song};

/// Split an ICY title into `(title, artist)`.
///
/// `"Artist - Title"` splits on the first `" - "`; anything else is a bare
/// title.
pub fn parse_icy(icy: &str) -> (Option<String>, Option<String>) {
    let s = icy.trim();
    if let Some(pos) = s.find(" - ") {
        let artist = s[..pos].trim().to_string();
        let title = s[pos + 3..].trim().to_string();
        (
            Some(title).filter(|t| !t.is_empty()),
            Some(artist).filter(|a| !a.is_empty()),
        )
    } else {
        (Some(s.to_string()).filter(|t| !t.is_empty()), None)
    }
}

/// Build a song from an ICY title.  Returns `None` for empty titles.
pub fn song_from_icy(icy: &str, index: u64, station_id: &str, audio_url: &str) -> Option<Song> {
    let (title, artist) = parse_icy(icy);
    let title = title?;
    let started_at = Local::now();
    let nanos = started_at.timestamp_nanos_opt().unwrap_or_default();
    let track_token = format!(
        "{:016x}",
        fnv1a(&[&nanos.to_le_bytes(), &index.to_le_bytes(), icy.as_bytes()])
    );
    Some(Song {
        index,
        track_token,
        title,
        artist: artist.unwrap_or_default(),
        audio_url: audio_url.to_string(),
        station_id: station_id.to_string(),
        started_at,
        ..Song::default()
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingEntry {
    #[serde(default)]
    pub rating: Option<Rating>,
    #[serde(default)]
    pub tired: bool,
}

impl RatingEntry {
    fn is_empty(&self) -> bool {
        self.rating.is_none() && !self.tired
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RatingsFile {
    #[serde(default)]
    song: BTreeMap<String, RatingEntry>,
}

/// Persisted ratings keyed by lowercased `"artist - title"`.
#[derive(Debug)]
pub struct RatingsStore {
    path: PathBuf,
    entries: BTreeMap<String, RatingEntry>,
}

impl RatingsStore {
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<RatingsFile>(&content) {
                Ok(file) => file.song,
                Err(e) => {
                    warn!("Ignoring unreadable ratings file {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        debug!("Loaded {} song ratings", entries.len());
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    pub fn key(song: &Song) -> String {
        format!("{} - {}", song.artist, song.title).to_lowercase()
    }

    pub fn get(&self, song: &Song) -> Option<&RatingEntry> {
        self.entries.get(&Self::key(song))
    }

    /// Copy any stored rating onto `song`.
    pub fn apply(&self, song: &mut Song) {
        if let Some(entry) = self.get(song) {
            song.rating = entry.rating;
            song.tired = entry.tired;
        }
    }

    /// Store the rating and tired flag currently on `song`.
    pub fn record(&mut self, song: &Song) -> anyhow::Result<()> {
        let entry = RatingEntry {
            rating: song.rating,
            tired: song.tired,
        };
        let key = Self::key(song);
        if entry.is_empty() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, entry);
        }
        self.save()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = RatingsFile {
            song: self.entries.clone(),
        };
        std::fs::write(&self.path, toml::to_string_pretty(&file)?)?;
        Ok(())
    }
}
