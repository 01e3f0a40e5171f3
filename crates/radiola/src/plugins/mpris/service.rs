//! The `org.mpris.MediaPlayer2` object: root, Player and Playlists.

use std::collections::HashMap;

use zbus::fdo;
use zbus::zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};
use zbus::SignalContext;

use radiola_core::protocol::{PlaybackStatus, Song, Station};

use crate::window::Window;

pub const BUS_NAME: &str = "org.mpris.MediaPlayer2.Radiola";
pub const OBJECT_PATH: &str = "/org/mpris/MediaPlayer2";
const TRACK_PREFIX: &str = "/org/mpris/MediaPlayer2/TrackList";
const PLAYLIST_PREFIX: &str = "/org/mpris/MediaPlayer2/Playlists";

pub type Metadata = HashMap<String, OwnedValue>;
/// `(oss)`: object path, name, icon.
pub type Playlist = (OwnedObjectPath, String, String);

/// MPRIS volume is perceptual; ours is linear.
pub fn to_mpris_volume(linear: f64) -> f64 {
    linear.max(0.0).cbrt()
}

pub fn from_mpris_volume(value: f64) -> f64 {
    value.clamp(0.0, 1.0).powi(3)
}

fn put<'a>(map: &mut Metadata, key: &str, value: impl Into<Value<'a>>) {
    if let Ok(v) = OwnedValue::try_from(value.into()) {
        map.insert(key.to_string(), v);
    }
}

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

/// Player metadata for `song`; `NoTrack` when nothing plays.
pub fn metadata(song: Option<&Song>) -> Metadata {
    let mut map = Metadata::new();
    let Some(song) = song else {
        if let Ok(path) = ObjectPath::try_from(format!("{TRACK_PREFIX}/NoTrack")) {
            put(&mut map, "mpris:trackid", path);
        }
        return map;
    };

    if let Ok(path) = ObjectPath::try_from(format!("{TRACK_PREFIX}/{}", song.track_token)) {
        put(&mut map, "mpris:trackid", path);
    }
    if let Some(secs) = song.length_secs {
        put(&mut map, "mpris:length", (secs * 1_000_000.0) as i64);
    }
    put(&mut map, "xesam:userRating", if song.is_loved() { 5i32 } else { 0i32 });
    put(
        &mut map,
        "radiola:rating",
        song.rating.map(|r| r.as_str()).unwrap_or(""),
    );
    put(&mut map, "xesam:title", or_default(&song.title, "Title Unknown"));
    put(&mut map, "xesam:album", or_default(&song.album, "Unknown Album"));
    put(
        &mut map,
        "xesam:artist",
        vec![or_default(&song.artist, "Unknown Artist").to_string()],
    );
    if let Some(url) = &song.art_url {
        put(&mut map, "mpris:artUrl", url.as_str());
    }
    map
}

pub fn playlist_path(station_id: &str) -> Option<OwnedObjectPath> {
    OwnedObjectPath::try_from(format!("{PLAYLIST_PREFIX}/{station_id}")).ok()
}

fn station_id_from_path(path: &str) -> Option<&str> {
    path.strip_prefix(PLAYLIST_PREFIX)?.strip_prefix('/')
}

pub fn playlist(station: &Station) -> Option<Playlist> {
    Some((playlist_path(&station.id)?, station.name.clone(), String::new()))
}

/// Slice of stations for `GetPlaylists`.
pub fn order_playlists(
    mut stations: Vec<Station>,
    index: u32,
    max_count: u32,
    order: &str,
    reverse: bool,
) -> Vec<Station> {
    if order == "Alphabetical" {
        stations.sort_by_key(|s| s.name.to_lowercase());
    }
    if reverse {
        stations.reverse();
    }
    stations
        .into_iter()
        .skip(index as usize)
        .take(max_count as usize)
        .collect()
}

// ── org.mpris.MediaPlayer2 ──────────────────────────────────────────────────

pub struct RootIface {
    pub window: Window,
}

#[zbus::interface(name = "org.mpris.MediaPlayer2")]
impl RootIface {
    fn raise(&self) {
        self.window.bring_to_top();
    }

    fn quit(&self) {
        self.window.quit();
    }

    #[zbus(property)]
    fn can_quit(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn fullscreen(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn can_set_fullscreen(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn can_raise(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn has_track_list(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn identity(&self) -> &str {
        "Radiola"
    }

    #[zbus(property)]
    fn desktop_entry(&self) -> &str {
        "radiola"
    }

    #[zbus(property)]
    fn supported_uri_schemes(&self) -> Vec<String> {
        vec!["http".into(), "file".into()]
    }

    #[zbus(property)]
    fn supported_mime_types(&self) -> Vec<String> {
        vec!["audio/mpeg".into(), "audio/aac".into()]
    }
}

// ── org.mpris.MediaPlayer2.Player ───────────────────────────────────────────

pub struct PlayerIface {
    pub window: Window,
    /// Last reported values, to emit changes only when they differ.
    pub status: PlaybackStatus,
    pub volume: f64,
}

impl PlayerIface {
    pub async fn new(window: Window) -> Self {
        let status = window.playback_status().await;
        let volume = to_mpris_volume(window.volume().await);
        Self {
            window,
            status,
            volume,
        }
    }
}

#[zbus::interface(name = "org.mpris.MediaPlayer2.Player")]
impl PlayerIface {
    async fn next(&self) {
        self.window.next_song().await;
    }

    fn previous(&self) {}

    async fn pause(&self) {
        self.window.pause().await;
    }

    async fn play_pause(&self) {
        self.window.playpause().await;
    }

    /// Live radio cannot stop cleanly mid-song; pause instead.
    async fn stop(&self) {
        self.window.pause().await;
    }

    async fn play(&self) {
        self.window.play().await;
    }

    fn seek(&self, _offset: i64) {}

    fn set_position(&self, _track_id: ObjectPath<'_>, _position: i64) {}

    fn open_uri(&self, _uri: &str) -> fdo::Result<()> {
        Err(fdo::Error::NotSupported("OpenUri is not supported".into()))
    }

    async fn love_current_song(&self) {
        self.window.love_song().await;
    }

    async fn ban_current_song(&self) {
        self.window.ban_song().await;
    }

    async fn tired_current_song(&self) {
        self.window.tired_song().await;
    }

    async fn unrate_current_song(&self) {
        self.window.unrate_song().await;
    }

    #[zbus(property)]
    fn playback_status(&self) -> &str {
        self.status.mpris_label()
    }

    #[zbus(property)]
    fn loop_status(&self) -> &str {
        "None"
    }

    #[zbus(property)]
    fn rate(&self) -> f64 {
        1.0
    }

    #[zbus(property)]
    fn minimum_rate(&self) -> f64 {
        1.0
    }

    #[zbus(property)]
    fn maximum_rate(&self) -> f64 {
        1.0
    }

    #[zbus(property)]
    fn shuffle(&self) -> bool {
        false
    }

    #[zbus(property)]
    async fn metadata(&self) -> Metadata {
        metadata(self.window.current_song().await.as_ref())
    }

    #[zbus(property)]
    fn volume(&self) -> f64 {
        self.volume
    }

    #[zbus(property)]
    async fn set_volume(&mut self, value: f64) {
        self.window.set_volume(from_mpris_volume(value)).await;
    }

    #[zbus(property(emits_changed_signal = "false"))]
    async fn position(&self) -> i64 {
        self.window
            .position_secs()
            .await
            .map(|secs| (secs * 1_000_000.0) as i64)
            .unwrap_or(0)
    }

    #[zbus(property)]
    async fn can_go_next(&self) -> bool {
        !self.window.waiting_for_playlist().await
    }

    #[zbus(property)]
    fn can_go_previous(&self) -> bool {
        false
    }

    #[zbus(property)]
    async fn can_play(&self) -> bool {
        self.window.current_song().await.is_some()
    }

    #[zbus(property)]
    async fn can_pause(&self) -> bool {
        self.window.current_song().await.is_some()
    }

    #[zbus(property)]
    fn can_seek(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn can_control(&self) -> bool {
        true
    }
}

// ── org.mpris.MediaPlayer2.Playlists ────────────────────────────────────────

pub struct PlaylistsIface {
    pub window: Window,
}

#[zbus::interface(name = "org.mpris.MediaPlayer2.Playlists")]
impl PlaylistsIface {
    async fn activate_playlist(&self, playlist_id: ObjectPath<'_>) -> fdo::Result<()> {
        let id = station_id_from_path(playlist_id.as_str())
            .ok_or_else(|| fdo::Error::InvalidArgs(format!("unknown playlist {}", playlist_id)))?;
        if self.window.state_manager().station(id).await.is_none() {
            return Err(fdo::Error::InvalidArgs(format!("unknown playlist {}", playlist_id)));
        }
        self.window.set_station(id).await;
        Ok(())
    }

    async fn get_playlists(
        &self,
        index: u32,
        max_count: u32,
        order: &str,
        reverse_order: bool,
    ) -> Vec<Playlist> {
        order_playlists(self.window.stations().await, index, max_count, order, reverse_order)
            .iter()
            .filter_map(playlist)
            .collect()
    }

    #[zbus(signal)]
    pub async fn playlist_changed(ctxt: &SignalContext<'_>, playlist: Playlist) -> zbus::Result<()>;

    #[zbus(property)]
    async fn playlist_count(&self) -> u32 {
        self.window.stations().await.len() as u32
    }

    #[zbus(property)]
    fn orderings(&self) -> Vec<String> {
        vec!["Alphabetical".into(), "UserDefined".into()]
    }

    #[zbus(property)]
    async fn active_playlist(&self) -> (bool, Playlist) {
        let active = self.window.current_station().await.as_ref().and_then(playlist);
        match active {
            Some(p) => (true, p),
            None => (
                false,
                (
                    OwnedObjectPath::from(ObjectPath::from_static_str_unchecked("/")),
                    String::new(),
                    String::new(),
                ),
            ),
        }
    }
}
