use crate::protocol::{
    station_id, MpvHealth, PlaybackStatus, PlayerState, Rating, Song, Station, QUICKMIX_ID,
};
use crate::songs::{song_from_icy, RatingsStore};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// Songs kept in the history list.
pub const HISTORY_LEN: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentState {
    pub last_station_id: Option<String>,
    pub volume: f64,
}

impl Default for PersistentState {
    fn default() -> Self {
        Self {
            last_station_id: None,
            volume: 0.5,
        }
    }
}

pub struct StateManager {
    state: Arc<RwLock<PlayerState>>,
    state_file: PathBuf,
    ratings: Mutex<RatingsStore>,
    song_counter: AtomicU64,
}

impl StateManager {
    pub fn new(state_file: PathBuf, ratings_file: &Path, stations: Vec<Station>) -> Self {
        let persistent = Self::load_persistent(&state_file);
        let stations = with_quick_mix(stations);
        let current_station = persistent
            .last_station_id
            .filter(|id| stations.iter().any(|s| &s.id == id));

        let state = PlayerState {
            rev: 1,
            stations,
            current_station,
            volume: persistent.volume.clamp(0.0, 1.0),
            ..PlayerState::default()
        };

        Self {
            state: Arc::new(RwLock::new(state)),
            state_file,
            ratings: Mutex::new(RatingsStore::load(ratings_file)),
            song_counter: AtomicU64::new(0),
        }
    }

    pub async fn get_state(&self) -> PlayerState {
        self.state.read().await.clone()
    }

    pub async fn stations(&self) -> Vec<Station> {
        self.state.read().await.stations.clone()
    }

    pub async fn station(&self, id: &str) -> Option<Station> {
        self.state.read().await.station(id).cloned()
    }

    pub async fn current_song(&self) -> Option<Song> {
        self.state.read().await.current_song.clone()
    }

    /// `selected` is what the user picked (possibly QuickMix), `playing` the
    /// station actually streamed.
    pub async fn set_station_playing(&self, selected: &str, playing: &str) -> anyhow::Result<()> {
        {
            let mut state = self.state.write().await;
            state.current_station = Some(selected.to_string());
            state.playing_station = Some(playing.to_string());
            state.playback_status = PlaybackStatus::Connecting;
            state.current_song = None; // stale song from previous station
            state.time_pos_secs = None;
            state.rev += 1;
        }
        self.save().await
    }

    pub async fn set_stopped(&self) -> anyhow::Result<()> {
        {
            let mut state = self.state.write().await;
            state.playback_status = PlaybackStatus::Idle;
            state.playing_station = None;
            state.current_song = None;
            state.time_pos_secs = None;
            state.rev += 1;
        }
        self.save().await
    }

    pub async fn set_playback_status(&self, status: PlaybackStatus) {
        let mut state = self.state.write().await;
        state.playback_status = status;
        state.rev += 1;
    }

    pub async fn set_mpv_health(&self, health: MpvHealth) {
        let mut state = self.state.write().await;
        state.mpv_health = health;
        state.rev += 1;
    }

    pub async fn set_volume(&self, volume: f64) -> anyhow::Result<()> {
        {
            let mut state = self.state.write().await;
            state.volume = volume.clamp(0.0, 1.0);
            state.rev += 1;
        }
        self.save().await
    }

    pub async fn set_position(&self, time_pos_secs: Option<f64>) {
        let mut state = self.state.write().await;
        state.time_pos_secs = time_pos_secs;
        state.rev += 1;
    }

    /// Start a new song from an ICY title.  Returns `None` when the title is
    /// empty or the same song is still playing.
    pub async fn begin_song(&self, icy: &str) -> Option<Song> {
        let mut state = self.state.write().await;
        let station = state.playing_station().cloned()?;
        if let Some(current) = &state.current_song {
            if current.display() == icy.trim() {
                return None;
            }
        }
        let index = self.song_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let mut song = song_from_icy(icy, index, &station.id, &station.url)?;
        song.detail_url = Some(station.url.clone());
        self.lock_ratings().apply(&mut song);

        state.history.push(song.clone());
        if state.history.len() > HISTORY_LEN {
            let excess = state.history.len() - HISTORY_LEN;
            state.history.drain(..excess);
        }
        state.current_song = Some(song.clone());
        state.time_pos_secs = Some(0.0);
        state.rev += 1;
        Some(song)
    }

    /// Set the art URL of the song with `index`.  Returns the updated song.
    pub async fn set_song_art(&self, index: u64, url: &str) -> Option<Song> {
        let mut state = self.state.write().await;
        let mut updated = None;
        for song in state.history.iter_mut().filter(|s| s.index == index) {
            song.art_url = Some(url.to_string());
            updated = Some(song.clone());
        }
        if let Some(current) = state.current_song.as_mut().filter(|s| s.index == index) {
            current.art_url = Some(url.to_string());
        }
        if updated.is_some() {
            state.rev += 1;
        }
        updated
    }

    /// Rate the current song; `None` clears the rating.  Returns the song.
    pub async fn rate_current(&self, rating: Option<Rating>) -> anyhow::Result<Option<Song>> {
        self.update_current(|song| {
            song.rating = rating;
            if rating.is_none() {
                song.tired = false;
            }
        })
        .await
    }

    pub async fn set_tired(&self) -> anyhow::Result<Option<Song>> {
        self.update_current(|song| song.tired = true).await
    }

    async fn update_current(&self, f: impl FnOnce(&mut Song)) -> anyhow::Result<Option<Song>> {
        let song = {
            let mut state = self.state.write().await;
            let Some(current) = state.current_song.as_mut() else {
                return Ok(None);
            };
            f(current);
            let song = current.clone();
            if let Some(entry) = state.history.iter_mut().find(|s| s.index == song.index) {
                *entry = song.clone();
            }
            state.rev += 1;
            song
        };
        self.lock_ratings().record(&song)?;
        Ok(Some(song))
    }

    /// Append a station.  Returns false when one with the same URL exists.
    pub async fn add_station(&self, station: Station) -> bool {
        let mut state = self.state.write().await;
        if state.stations.iter().any(|s| s.url == station.url && !s.url.is_empty()) {
            return false;
        }
        state.stations.push(station);
        state.rev += 1;
        true
    }

    /// Random QuickMix member, avoiding `exclude` when there is a choice.
    pub async fn pick_quick_mix(&self, exclude: Option<&str>) -> Option<Station> {
        let state = self.state.read().await;
        let members: Vec<&Station> = state
            .stations
            .iter()
            .filter(|s| s.use_quick_mix && !s.is_quick_mix)
            .collect();
        let preferred: Vec<&Station> = members
            .iter()
            .copied()
            .filter(|s| Some(s.id.as_str()) != exclude)
            .collect();
        let pool = if preferred.is_empty() { &members } else { &preferred };
        pool.choose(&mut rand::thread_rng()).map(|s| (*s).clone())
    }

    /// Station `Next` should tune to: QuickMix stays on QuickMix (the caller
    /// re-rolls), otherwise the following regular station, wrapping around.
    pub async fn next_station_id(&self, current: Option<&str>) -> Option<String> {
        let state = self.state.read().await;
        if current == Some(QUICKMIX_ID) {
            return Some(QUICKMIX_ID.to_string());
        }
        let regular: Vec<&Station> = state.stations.iter().filter(|s| !s.is_quick_mix).collect();
        let next = match current.and_then(|id| regular.iter().position(|s| s.id == id)) {
            Some(pos) => regular.get((pos + 1) % regular.len()),
            None => regular.first(),
        };
        next.map(|s| s.id.clone())
    }

    fn lock_ratings(&self) -> std::sync::MutexGuard<'_, RatingsStore> {
        self.ratings.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn save(&self) -> anyhow::Result<()> {
        let state = self.state.read().await;
        let persistent = PersistentState {
            last_station_id: state.current_station.clone(),
            volume: state.volume,
        };

        if let Some(parent) = self.state_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(&persistent)?;
        tokio::fs::write(&self.state_file, json).await?;
        Ok(())
    }

    fn load_persistent(state_file: &Path) -> PersistentState {
        std::fs::read_to_string(state_file)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }
}

/// Ensure exactly one QuickMix station, in first position.
pub fn with_quick_mix(stations: Vec<Station>) -> Vec<Station> {
    let mut out = vec![Station::quick_mix()];
    out.extend(
        stations
            .into_iter()
            .filter(|s| !s.is_quick_mix && s.id != QUICKMIX_ID),
    );
    out
}

// ── TOML station files ────────────────────────────────────────────────────────

/// Mirrors the `[[station]]` table; kept apart from `Station` so the file
/// format can omit ids.
#[derive(Debug, Serialize, Deserialize)]
struct TomlStationFile {
    #[serde(default)]
    station: Vec<TomlStation>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TomlStation {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    name: String,
    url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    country: String,
    #[serde(default = "default_true")]
    quickmix: bool,
    #[serde(default)]
    requires_auth: bool,
}

fn default_true() -> bool {
    true
}

pub fn load_stations_from_toml(path: &Path) -> anyhow::Result<Vec<Station>> {
    let content = std::fs::read_to_string(path)?;
    parse_stations_from_toml_str(&content)
}

pub fn parse_stations_from_toml_str(content: &str) -> anyhow::Result<Vec<Station>> {
    let file: TomlStationFile = toml::from_str(content)?;
    let stations = file
        .station
        .into_iter()
        .map(|s| Station {
            id: if s.id.is_empty() {
                station_id(&s.name, &s.url)
            } else {
                s.id
            },
            name: s.name,
            url: s.url,
            description: s.description,
            tags: s.tags,
            country: s.country,
            is_quick_mix: false,
            use_quick_mix: s.quickmix,
            requires_auth: s.requires_auth,
        })
        .collect();
    Ok(stations)
}

/// Write all non-QuickMix stations back to `path`.
pub fn save_stations_to_toml(path: &Path, stations: &[Station]) -> anyhow::Result<()> {
    let file = TomlStationFile {
        station: stations
            .iter()
            .filter(|s| !s.is_quick_mix)
            .map(|s| TomlStation {
                id: s.id.clone(),
                name: s.name.clone(),
                url: s.url.clone(),
                description: s.description.clone(),
                tags: s.tags.clone(),
                country: s.country.clone(),
                quickmix: s.use_quick_mix,
                requires_auth: s.requires_auth,
            })
            .collect(),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(&file)?)?;
    Ok(())
}

/// Seed list written on first run.
pub fn default_stations() -> Vec<Station> {
    [
        ("SomaFM Groove Salad", "https://ice1.somafm.com/groovesalad-128-mp3", "ambient"),
        ("SomaFM Drone Zone", "https://ice1.somafm.com/dronezone-128-mp3", "ambient"),
        ("SomaFM Secret Agent", "https://ice1.somafm.com/secretagent-128-mp3", "lounge"),
        ("SomaFM Left Coast 70s", "https://ice1.somafm.com/seventies-128-mp3", "70s"),
        ("SomaFM Indie Pop Rocks!", "https://ice1.somafm.com/indiepop-128-mp3", "indie"),
    ]
    .into_iter()
    .map(|(name, url, tag)| Station {
        tags: vec![tag.to_string()],
        country: "US".to_string(),
        use_quick_mix: true,
        ..Station::new(name, url)
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &Path) -> StateManager {
        StateManager::new(
            dir.join("state.json"),
            &dir.join("ratings.toml"),
            default_stations(),
        )
    }

    #[test]
    fn quick_mix_is_first_and_unique() {
        let mut stations = default_stations();
        stations.push(Station::quick_mix());
        let stations = with_quick_mix(stations);
        assert!(stations[0].is_quick_mix);
        assert_eq!(stations.iter().filter(|s| s.is_quick_mix).count(), 1);
    }

    #[test]
    fn toml_station_ids_are_derived_when_missing() {
        let stations = parse_stations_from_toml_str(
            r#"
            [[station]]
            name = "One"
            url = "http://one"

            [[station]]
            id = "custom"
            name = "Two"
            url = "http://two"
            quickmix = false
            requires_auth = true
            "#,
        )
        .unwrap();
        assert_eq!(stations[0].id, station_id("One", "http://one"));
        assert!(stations[0].use_quick_mix);
        assert_eq!(stations[1].id, "custom");
        assert!(!stations[1].use_quick_mix);
        assert!(stations[1].requires_auth);
    }

    #[test]
    fn stations_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stations.toml");
        let stations = with_quick_mix(default_stations());
        save_stations_to_toml(&path, &stations).unwrap();
        let loaded = load_stations_from_toml(&path).unwrap();
        assert_eq!(loaded, default_stations());
    }

    #[tokio::test]
    async fn begin_song_skips_repeats_and_bounds_history() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let station = default_stations().remove(0);
        assert!(mgr.begin_song("A - B").await.is_none(), "no station playing");

        mgr.set_station_playing(&station.id, &station.id).await.unwrap();
        let first = mgr.begin_song("A - B").await.unwrap();
        assert_eq!(first.station_id, station.id);
        assert!(mgr.begin_song("A - B").await.is_none());

        for i in 0..HISTORY_LEN + 5 {
            mgr.begin_song(&format!("Artist - Song {i}")).await.unwrap();
        }
        let state = mgr.get_state().await;
        assert_eq!(state.history.len(), HISTORY_LEN);
        assert_eq!(state.history.last(), state.current_song.as_ref());
    }

    #[tokio::test]
    async fn rating_updates_history_and_store() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        assert!(mgr.rate_current(Some(Rating::Love)).await.unwrap().is_none());

        let station = default_stations().remove(1);
        mgr.set_station_playing(&station.id, &station.id).await.unwrap();
        mgr.begin_song("Boards of Canada - Roygbiv").await.unwrap();
        let song = mgr.rate_current(Some(Rating::Love)).await.unwrap().unwrap();
        assert!(song.is_loved());
        assert!(mgr.get_state().await.history[0].is_loved());

        // a fresh manager remembers the rating
        let mgr2 = manager(dir.path());
        mgr2.set_station_playing(&station.id, &station.id).await.unwrap();
        assert!(mgr2.begin_song("Boards of Canada - Roygbiv").await.unwrap().is_loved());
    }

    #[tokio::test]
    async fn set_song_art_targets_index() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let station = default_stations().remove(0);
        mgr.set_station_playing(&station.id, &station.id).await.unwrap();
        let song = mgr.begin_song("X - Y").await.unwrap();
        assert!(mgr.set_song_art(song.index + 100, "file:///a.jpg").await.is_none());
        let updated = mgr.set_song_art(song.index, "file:///a.jpg").await.unwrap();
        assert_eq!(updated.art_url.as_deref(), Some("file:///a.jpg"));
        assert_eq!(
            mgr.current_song().await.unwrap().art_url.as_deref(),
            Some("file:///a.jpg")
        );
    }

    #[tokio::test]
    async fn quick_mix_picks_other_member() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let current = default_stations().remove(0);
        for _ in 0..20 {
            let picked = mgr.pick_quick_mix(Some(&current.id)).await.unwrap();
            assert_ne!(picked.id, current.id);
            assert!(!picked.is_quick_mix);
        }
    }

    #[tokio::test]
    async fn next_station_wraps_and_keeps_quick_mix() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let regular: Vec<Station> = mgr
            .stations()
            .await
            .into_iter()
            .filter(|s| !s.is_quick_mix)
            .collect();
        let last = regular.last().unwrap().id.clone();
        assert_eq!(mgr.next_station_id(Some(&last)).await, Some(regular[0].id.clone()));
        assert_eq!(
            mgr.next_station_id(Some(&regular[0].id)).await,
            Some(regular[1].id.clone())
        );
        assert_eq!(mgr.next_station_id(None).await, Some(regular[0].id.clone()));
        assert_eq!(
            mgr.next_station_id(Some(QUICKMIX_ID)).await.as_deref(),
            Some(QUICKMIX_ID)
        );
    }

    #[tokio::test]
    async fn add_station_rejects_duplicate_url() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path());
        let existing = default_stations().remove(0);
        assert!(!mgr.add_station(existing).await);
        assert!(mgr.add_station(Station::new("New", "http://new")).await);
        assert_eq!(mgr.stations().await.len(), default_stations().len() + 2);
    }

    #[tokio::test]
    async fn volume_and_station_persist() {
        let dir = tempfile::tempdir().unwrap();
        let station = default_stations().remove(2);
        {
            let mgr = manager(dir.path());
            mgr.set_volume(1.7).await.unwrap();
            mgr.set_station_playing(&station.id, &station.id).await.unwrap();
        }
        let state = manager(dir.path()).get_state().await;
        assert_eq!(state.volume, 1.0);
        assert_eq!(state.current_station.as_deref(), Some(station.id.as_str()));
    }
}
