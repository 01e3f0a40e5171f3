//! PlayerCore: single-owner event loop for playback.
//!
//! Every task that wants to change playback sends a [`CoreEvent`] here.  The
//! core owns the audio output exclusively and is the only writer of playback
//! fields in the [`StateManager`].  After each change it broadcasts the
//! matching [`WindowEvent`].
//!
//! mpv integration is property-observation driven: on every fresh connection
//! we `observe_property` core-idle, pause, the ICY title and time-pos, and
//! mpv pushes `property-change` events.  The 10 second heartbeat only checks
//! process liveness and the connect timeout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use radiola_core::protocol::{Command, MpvHealth, PlaybackStatus, Rating, Station};
use radiola_core::state::{save_stations_to_toml, StateManager};

use crate::mpv::{
    MpvDriver, MpvEvent, MpvHandle, OBS_CORE_IDLE, OBS_ICY_TITLE, OBS_ICY_TITLE_DIRECT, OBS_PAUSE,
    OBS_TIME_POS,
};
use crate::stream_proxy::StreamProxy;
use crate::window::WindowEvent;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const HEARTBEAT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum CoreEvent {
    Command(Command),
    Mpv(MpvEvent),
    HeartbeatTick,
    Shutdown,
}

// ── audio output ──────────────────────────────────────────────────────────────

/// What the core needs from a player backend.
#[async_trait]
pub trait AudioOutput: Send {
    async fn load(&mut self, url: &str, volume: f64) -> anyhow::Result<()>;
    async fn set_pause(&mut self, paused: bool) -> anyhow::Result<()>;
    async fn set_volume(&mut self, volume: f64) -> anyhow::Result<()>;
    async fn stop(&mut self) -> anyhow::Result<()>;
    /// False when the backend died since the last call.
    async fn check_alive(&mut self) -> bool;
    async fn shutdown(&mut self);
}

/// mpv over JSON IPC; events are forwarded into the core loop.
pub struct MpvOutput {
    driver: MpvDriver,
    handle: Option<MpvHandle>,
    core_tx: mpsc::Sender<CoreEvent>,
    state: Arc<StateManager>,
    events: broadcast::Sender<WindowEvent>,
    health: MpvHealth,
}

impl MpvOutput {
    pub fn new(
        core_tx: mpsc::Sender<CoreEvent>,
        state: Arc<StateManager>,
        events: broadcast::Sender<WindowEvent>,
        initial_volume: f64,
    ) -> Self {
        let mut driver = MpvDriver::new();
        driver.last_volume = initial_volume;
        Self {
            driver,
            handle: None,
            core_tx,
            state,
            events,
            health: MpvHealth::Absent,
        }
    }

    async fn set_health(&mut self, health: MpvHealth) {
        if self.health != health {
            info!("mpv health {:?} → {:?}", self.health, health);
            self.health = health.clone();
            self.state.set_mpv_health(health).await;
            let _ = self.events.send(WindowEvent::StateUpdated);
        }
    }

    async fn ensure_handle(&mut self) -> anyhow::Result<MpvHandle> {
        if self.handle.is_some() && !self.driver.process_alive() {
            warn!("mpv process died, dropping handle");
            self.handle = None;
            self.set_health(MpvHealth::Dead).await;
        }
        if let Some(handle) = &self.handle {
            return Ok(handle.clone());
        }

        // one forwarder per connection
        let (event_tx, mut event_rx) = mpsc::channel::<MpvEvent>(64);
        let core_tx = self.core_tx.clone();
        tokio::spawn(async move {
            while let Some(evt) = event_rx.recv().await {
                if core_tx.send(CoreEvent::Mpv(evt)).await.is_err() {
                    break;
                }
            }
        });

        let handle = match self.driver.try_reconnect(event_tx.clone()).await {
            Some(h) => h,
            None => {
                let restarting = matches!(self.health, MpvHealth::Dead);
                self.set_health(if restarting {
                    MpvHealth::Restarting
                } else {
                    MpvHealth::Starting
                })
                .await;
                match self.driver.spawn_and_connect(event_tx).await {
                    Ok(h) => h,
                    Err(e) => {
                        self.set_health(MpvHealth::Dead).await;
                        return Err(e);
                    }
                }
            }
        };
        self.set_health(MpvHealth::Running).await;

        let observer = handle.clone();
        tokio::spawn(async move { observer.observe_all_properties().await });
        self.handle = Some(handle.clone());
        Ok(handle)
    }
}

#[async_trait]
impl AudioOutput for MpvOutput {
    async fn load(&mut self, url: &str, volume: f64) -> anyhow::Result<()> {
        let handle = self.ensure_handle().await?;
        handle.load_stream(url, volume).await
    }

    async fn set_pause(&mut self, paused: bool) -> anyhow::Result<()> {
        match &self.handle {
            Some(h) => h.set_pause(paused).await,
            None => Ok(()),
        }
    }

    async fn set_volume(&mut self, volume: f64) -> anyhow::Result<()> {
        self.driver.last_volume = volume;
        match &self.handle {
            Some(h) => h.set_volume(volume).await,
            None => Ok(()),
        }
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        match &self.handle {
            Some(h) => h.stop().await,
            None => Ok(()),
        }
    }

    async fn check_alive(&mut self) -> bool {
        if self.handle.is_some() && !self.driver.process_alive() {
            warn!("heartbeat: mpv process died");
            self.handle = None;
            self.set_health(MpvHealth::Dead).await;
            return false;
        }
        true
    }

    async fn shutdown(&mut self) {
        if let Some(h) = self.handle.take() {
            let _ = h.stop().await;
        }
        self.driver.kill().await;
    }
}

// ── core ──────────────────────────────────────────────────────────────────────

pub struct PlayerCore {
    state: Arc<StateManager>,
    events: broadcast::Sender<WindowEvent>,
    output: Box<dyn AudioOutput>,
    relay: Option<StreamProxy>,
    stations_path: PathBuf,
    /// The user asked for playback (used to derive status).
    intend_playing: bool,
    obs_core_idle: Option<bool>,
    obs_pause: bool,
    obs_icy_title: Option<String>,
    last_position_secs: Option<u64>,
    connecting_since: Option<Instant>,
    last_status: PlaybackStatus,
}

impl PlayerCore {
    pub fn new(
        state: Arc<StateManager>,
        events: broadcast::Sender<WindowEvent>,
        output: Box<dyn AudioOutput>,
        relay: Option<StreamProxy>,
        stations_path: PathBuf,
    ) -> Self {
        Self {
            state,
            events,
            output,
            relay,
            stations_path,
            intend_playing: false,
            obs_core_idle: None,
            obs_pause: false,
            obs_icy_title: None,
            last_position_secs: None,
            connecting_since: None,
            last_status: PlaybackStatus::Idle,
        }
    }

    fn emit(&self, event: WindowEvent) {
        let _ = self.events.send(event);
    }

    /// Run until `Shutdown` or until every sender is gone.
    pub async fn run(
        mut self,
        self_tx: mpsc::Sender<CoreEvent>,
        mut event_rx: mpsc::Receiver<CoreEvent>,
    ) -> anyhow::Result<()> {
        info!("PlayerCore: starting event loop");

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(HEARTBEAT).await;
                if self_tx.send(CoreEvent::HeartbeatTick).await.is_err() {
                    break;
                }
            }
        });

        while let Some(evt) = event_rx.recv().await {
            if !self.handle_event(evt).await {
                break;
            }
        }

        info!("PlayerCore: shutting down");
        self.output.shutdown().await;
        Ok(())
    }

    /// Returns false when the loop should stop.
    pub async fn handle_event(&mut self, evt: CoreEvent) -> bool {
        match evt {
            CoreEvent::Shutdown => return false,
            CoreEvent::Command(cmd) => {
                debug!("PlayerCore: command {:?}", cmd);
                if let Err(e) = self.handle_command(cmd).await {
                    error!("PlayerCore: command error: {}", e);
                }
            }
            CoreEvent::Mpv(evt) => self.handle_mpv_event(evt).await,
            CoreEvent::HeartbeatTick => {
                if !self.output.check_alive().await {
                    self.reset_observed_state();
                }
                if self.intend_playing && !self.obs_pause {
                    self.maybe_update_status().await;
                }
            }
        }
        true
    }

    // ── mpv events ────────────────────────────────────────────────────────────

    async fn handle_mpv_event(&mut self, evt: MpvEvent) {
        if let Some((obs_id, data)) = evt.as_property_change() {
            match obs_id {
                OBS_CORE_IDLE => {
                    let val = data.as_bool();
                    if val != self.obs_core_idle {
                        self.obs_core_idle = val;
                        self.maybe_update_status().await;
                    }
                }
                OBS_PAUSE => {
                    let val = data.as_bool().unwrap_or(false);
                    if val != self.obs_pause {
                        self.obs_pause = val;
                        self.maybe_update_status().await;
                    }
                }
                OBS_ICY_TITLE | OBS_ICY_TITLE_DIRECT => {
                    let title = data
                        .as_str()
                        .filter(|t| !t.trim().trim_matches('-').trim().is_empty())
                        .map(str::to_string);
                    if title != self.obs_icy_title {
                        info!("icy-title {:?} → {:?}", self.obs_icy_title, title);
                        self.obs_icy_title = title.clone();
                        if let Some(title) = title {
                            self.begin_song(&title).await;
                        }
                    }
                }
                OBS_TIME_POS => {
                    let pos = data.as_f64();
                    self.state.set_position(pos).await;
                    let whole = pos.map(|p| p as u64);
                    if whole != self.last_position_secs {
                        self.last_position_secs = whole;
                        self.emit(WindowEvent::StateUpdated);
                    }
                }
                _ => {}
            }
            return;
        }

        match evt.event_name() {
            Some("end-file") => {
                let reason = evt.raw.get("reason").and_then(|v| v.as_str()).unwrap_or("unknown");
                info!("mpv: end-file reason={}", reason);
                if matches!(reason, "error" | "network" | "quit") && self.intend_playing && !self.obs_pause {
                    warn!("stream ended ({}), marking Error", reason);
                    self.set_status(PlaybackStatus::Error).await;
                    self.connecting_since = None;
                }
                self.obs_icy_title = None;
                self.obs_core_idle = Some(true);
                self.maybe_update_status().await;
            }
            Some("start-file") => {
                self.connecting_since = None;
                self.obs_core_idle = Some(true);
                self.maybe_update_status().await;
            }
            _ => {}
        }
    }

    async fn begin_song(&mut self, icy: &str) {
        let Some(song) = self.state.begin_song(icy).await else {
            return;
        };
        info!("Now playing: {}", song.display());
        self.emit(WindowEvent::SongChanged(song.clone()));
        self.emit(WindowEvent::MetadataChanged(song.clone()));
        if song.art_url.is_none() {
            self.emit(WindowEvent::NoArtUrl(song));
        }
        self.emit(WindowEvent::StateUpdated);
    }

    /// Derive the status from what mpv reported.
    async fn maybe_update_status(&mut self) {
        let status = if !self.intend_playing {
            self.connecting_since = None;
            PlaybackStatus::Idle
        } else if self.obs_pause {
            self.connecting_since = None;
            PlaybackStatus::Paused
        } else if self.obs_core_idle == Some(false) {
            self.connecting_since = None;
            PlaybackStatus::Playing
        } else if self.last_status == PlaybackStatus::Error && self.connecting_since.is_none() {
            PlaybackStatus::Error
        } else {
            let since = self.connecting_since.get_or_insert_with(Instant::now);
            if since.elapsed() >= CONNECT_TIMEOUT {
                warn!("no audio after {}s, marking Error", since.elapsed().as_secs());
                PlaybackStatus::Error
            } else {
                PlaybackStatus::Connecting
            }
        };
        self.set_status(status).await;
    }

    async fn set_status(&mut self, status: PlaybackStatus) {
        if status != self.last_status {
            info!("status {:?} → {:?}", self.last_status, status);
            self.last_status = status;
            self.state.set_playback_status(status).await;
            self.emit(WindowEvent::PlayStateChanged(status));
            self.emit(WindowEvent::StateUpdated);
        }
    }

    fn reset_observed_state(&mut self) {
        self.obs_core_idle = None;
        self.obs_pause = false;
        self.obs_icy_title = None;
        self.connecting_since = None;
    }

    // ── commands ──────────────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: Command) -> anyhow::Result<()> {
        match cmd {
            Command::PlayStation { id } => self.play_station(&id).await?,
            Command::Play => self.play().await?,
            Command::Pause => self.pause().await?,
            Command::PlayPause => {
                if self.intend_playing && !self.obs_pause {
                    self.pause().await?
                } else {
                    self.play().await?
                }
            }
            Command::Stop => self.stop().await?,
            Command::Next => self.next().await?,
            Command::Volume { value } => self.set_volume(value).await?,
            Command::Rate { rating } => self.rate(Some(rating)).await?,
            Command::Unrate => self.rate(None).await?,
            Command::Tired => {
                if let Some(song) = self.state.set_tired().await? {
                    self.emit(WindowEvent::MetadataChanged(song));
                    self.next().await?;
                }
            }
            Command::AddStation { station } => self.add_station(station).await?,
            Command::SetSongArt { index, url } => {
                if let Some(song) = self.state.set_song_art(index, &url).await {
                    let is_current = self
                        .state
                        .current_song()
                        .await
                        .is_some_and(|s| s.index == song.index);
                    if is_current {
                        self.emit(WindowEvent::MetadataChanged(song));
                    }
                    self.emit(WindowEvent::StateUpdated);
                }
            }
        }
        Ok(())
    }

    async fn play_station(&mut self, id: &str) -> anyhow::Result<()> {
        let Some(selected) = self.state.station(id).await else {
            warn!("Unknown station id {}", id);
            return Ok(());
        };
        let station = if selected.is_quick_mix {
            let playing = self.state.get_state().await.playing_station;
            match self.state.pick_quick_mix(playing.as_deref()).await {
                Some(s) => s,
                None => {
                    warn!("QuickMix has no member stations");
                    return Ok(());
                }
            }
        } else {
            selected.clone()
        };
        info!("Playing station: {} (selected {})", station.name, selected.name);

        self.reset_observed_state();
        self.intend_playing = true;
        self.last_status = PlaybackStatus::Connecting;
        self.state.set_station_playing(&selected.id, &station.id).await?;
        self.emit(WindowEvent::StationChanged(selected));
        self.emit(WindowEvent::PlayStateChanged(PlaybackStatus::Connecting));
        self.emit(WindowEvent::StateUpdated);

        let url = self.stream_url(&station);
        let volume = self.state.get_state().await.volume;
        if let Err(e) = self.output.load(&url, volume).await {
            warn!("Failed to load '{}': {}", station.name, e);
            self.intend_playing = false;
            self.set_status(PlaybackStatus::Error).await;
        }
        Ok(())
    }

    /// HLS goes direct, everything else through the local relay.
    fn stream_url(&self, station: &Station) -> String {
        match &self.relay {
            Some(relay) if !station.url.to_ascii_lowercase().contains(".m3u8") => {
                relay.url(&station.id)
            }
            _ => station.url.clone(),
        }
    }

    async fn play(&mut self) -> anyhow::Result<()> {
        if self.intend_playing {
            if self.obs_pause {
                self.output.set_pause(false).await?;
            }
            return Ok(());
        }
        let state = self.state.get_state().await;
        let target = state
            .current_station
            .clone()
            .or_else(|| state.stations.iter().find(|s| !s.is_quick_mix).map(|s| s.id.clone()));
        match target {
            Some(id) => self.play_station(&id).await,
            None => Ok(()),
        }
    }

    async fn pause(&mut self) -> anyhow::Result<()> {
        if self.intend_playing && !self.obs_pause {
            self.output.set_pause(true).await?;
        }
        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        info!("Stopping playback");
        self.intend_playing = false;
        self.output.stop().await?;
        self.state.set_stopped().await?;
        self.reset_observed_state();
        self.set_status(PlaybackStatus::Idle).await;
        self.emit(WindowEvent::StateUpdated);
        Ok(())
    }

    /// QuickMix re-rolls; otherwise the next station in list order.
    async fn next(&mut self) -> anyhow::Result<()> {
        let current = self.state.get_state().await.current_station;
        if current.is_none() {
            return self.play().await;
        }
        if let Some(id) = self.state.next_station_id(current.as_deref()).await {
            self.play_station(&id).await?;
        }
        Ok(())
    }

    async fn set_volume(&mut self, value: f64) -> anyhow::Result<()> {
        let previous = self.state.get_state().await.volume;
        let value = value.clamp(0.0, 1.0);
        self.state.set_volume(value).await?;
        self.output.set_volume(value).await?;
        if (previous - value).abs() > f64::EPSILON {
            self.emit(WindowEvent::VolumeChanged(value));
            self.emit(WindowEvent::StateUpdated);
        }
        Ok(())
    }

    async fn rate(&mut self, rating: Option<Rating>) -> anyhow::Result<()> {
        let Some(song) = self.state.rate_current(rating).await? else {
            return Ok(());
        };
        info!(
            "Rated {} as {}",
            song.display(),
            rating.map(Rating::as_str).unwrap_or("unrated")
        );
        self.emit(WindowEvent::MetadataChanged(song));
        self.emit(WindowEvent::StateUpdated);
        if rating == Some(Rating::Ban) {
            self.next().await?;
        }
        Ok(())
    }

    /// Append the station if its URL is new, persist the list, tune in.
    async fn add_station(&mut self, station: Station) -> anyhow::Result<()> {
        let url = station.url.clone();
        if self.state.add_station(station).await {
            let stations = self.state.stations().await;
            if let Err(e) = save_stations_to_toml(&self.stations_path, &stations) {
                warn!("Failed to save {}: {}", self.stations_path.display(), e);
            }
            self.emit(WindowEvent::StationsChanged);
        }
        let id = self
            .state
            .stations()
            .await
            .into_iter()
            .find(|s| s.url == url)
            .map(|s| s.id);
        if let Some(id) = id {
            self.play_station(&id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radiola_core::protocol::QUICKMIX_ID;
    use radiola_core::state::default_stations;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default, Clone)]
    struct FakeOutput {
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl AudioOutput for FakeOutput {
        async fn load(&mut self, url: &str, _volume: f64) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("load {url}"));
            Ok(())
        }
        async fn set_pause(&mut self, paused: bool) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("pause {paused}"));
            Ok(())
        }
        async fn set_volume(&mut self, volume: f64) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("volume {volume}"));
            Ok(())
        }
        async fn stop(&mut self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push("stop".into());
            Ok(())
        }
        async fn check_alive(&mut self) -> bool {
            true
        }
        async fn shutdown(&mut self) {}
    }

    struct Rig {
        core: PlayerCore,
        output: FakeOutput,
        events: broadcast::Receiver<WindowEvent>,
        state: Arc<StateManager>,
        _dir: tempfile::TempDir,
    }

    fn rig() -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(StateManager::new(
            dir.path().join("state.json"),
            &dir.path().join("ratings.toml"),
            default_stations(),
        ));
        let (tx, events) = broadcast::channel(256);
        let output = FakeOutput::default();
        let core = PlayerCore::new(
            state.clone(),
            tx,
            Box::new(output.clone()),
            None,
            dir.path().join("stations.toml"),
        );
        Rig {
            core,
            output,
            events,
            state,
            _dir: dir,
        }
    }

    fn drain(rx: &mut broadcast::Receiver<WindowEvent>) -> Vec<WindowEvent> {
        let mut out = Vec::new();
        while let Ok(evt) = rx.try_recv() {
            out.push(evt);
        }
        out
    }

    fn prop(id: u64, data: serde_json::Value) -> CoreEvent {
        CoreEvent::Mpv(MpvEvent {
            raw: json!({"event": "property-change", "id": id, "data": data}),
        })
    }

    async fn cmd(core: &mut PlayerCore, cmd: Command) {
        assert!(core.handle_event(CoreEvent::Command(cmd)).await);
    }

    #[tokio::test]
    async fn play_station_loads_and_reaches_playing() {
        let mut r = rig();
        let station = default_stations().remove(0);
        cmd(&mut r.core, Command::PlayStation { id: station.id.clone() }).await;
        assert_eq!(r.output.calls.lock().unwrap()[0], format!("load {}", station.url));
        assert_eq!(r.state.get_state().await.playback_status, PlaybackStatus::Connecting);

        r.core.handle_event(prop(OBS_CORE_IDLE, json!(false))).await;
        assert_eq!(r.state.get_state().await.playback_status, PlaybackStatus::Playing);
        let events = drain(&mut r.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, WindowEvent::PlayStateChanged(PlaybackStatus::Playing))));
        assert!(events
            .iter()
            .any(|e| matches!(e, WindowEvent::StationChanged(s) if s.id == station.id)));
    }

    #[tokio::test]
    async fn icy_title_starts_song_without_art() {
        let mut r = rig();
        let station = default_stations().remove(0);
        cmd(&mut r.core, Command::PlayStation { id: station.id }).await;
        drain(&mut r.events);

        r.core.handle_event(prop(OBS_ICY_TITLE, json!("Air - La Femme d'Argent"))).await;
        let events = drain(&mut r.events);
        let song = events
            .iter()
            .find_map(|e| match e {
                WindowEvent::SongChanged(s) => Some(s.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(song.artist, "Air");
        assert!(events.iter().any(|e| matches!(e, WindowEvent::NoArtUrl(_))));

        // duplicate via the direct icy-title observer is ignored
        r.core
            .handle_event(prop(OBS_ICY_TITLE_DIRECT, json!("Air - La Femme d'Argent")))
            .await;
        assert!(!drain(&mut r.events)
            .iter()
            .any(|e| matches!(e, WindowEvent::SongChanged(_))));
    }

    #[tokio::test]
    async fn playpause_toggles_through_output() {
        let mut r = rig();
        let station = default_stations().remove(0);
        cmd(&mut r.core, Command::PlayStation { id: station.id }).await;
        r.core.handle_event(prop(OBS_CORE_IDLE, json!(false))).await;

        cmd(&mut r.core, Command::PlayPause).await;
        assert_eq!(r.output.calls.lock().unwrap().last().unwrap(), "pause true");
        r.core.handle_event(prop(OBS_PAUSE, json!(true))).await;
        assert_eq!(r.state.get_state().await.playback_status, PlaybackStatus::Paused);

        cmd(&mut r.core, Command::PlayPause).await;
        assert_eq!(r.output.calls.lock().unwrap().last().unwrap(), "pause false");
    }

    #[tokio::test]
    async fn play_from_idle_uses_first_regular_station() {
        let mut r = rig();
        cmd(&mut r.core, Command::Play).await;
        let first = default_stations().remove(0);
        assert_eq!(r.output.calls.lock().unwrap()[0], format!("load {}", first.url));
    }

    #[tokio::test]
    async fn next_cycles_regular_stations_and_rerolls_quick_mix() {
        let mut r = rig();
        let stations = default_stations();
        let last = stations.last().unwrap().clone();
        cmd(&mut r.core, Command::PlayStation { id: last.id }).await;
        cmd(&mut r.core, Command::Next).await;
        assert_eq!(
            r.state.get_state().await.current_station.as_deref(),
            Some(stations[0].id.as_str())
        );

        cmd(&mut r.core, Command::PlayStation { id: QUICKMIX_ID.into() }).await;
        let first_pick = r.state.get_state().await.playing_station.unwrap();
        cmd(&mut r.core, Command::Next).await;
        let state = r.state.get_state().await;
        assert_eq!(state.current_station.as_deref(), Some(QUICKMIX_ID));
        assert_ne!(state.playing_station.unwrap(), first_pick);
    }

    #[tokio::test]
    async fn ban_rates_and_skips() {
        let mut r = rig();
        let stations = default_stations();
        cmd(&mut r.core, Command::PlayStation { id: stations[0].id.clone() }).await;
        r.core.handle_event(prop(OBS_ICY_TITLE, json!("A - B"))).await;
        drain(&mut r.events);

        cmd(&mut r.core, Command::Rate { rating: Rating::Ban }).await;
        let events = drain(&mut r.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, WindowEvent::MetadataChanged(s) if s.is_banned())));
        assert_eq!(
            r.state.get_state().await.current_station.as_deref(),
            Some(stations[1].id.as_str())
        );
    }

    #[tokio::test]
    async fn volume_change_is_emitted_once() {
        let mut r = rig();
        cmd(&mut r.core, Command::Volume { value: 0.8 }).await;
        cmd(&mut r.core, Command::Volume { value: 0.8 }).await;
        let changes = drain(&mut r.events)
            .into_iter()
            .filter(|e| matches!(e, WindowEvent::VolumeChanged(_)))
            .count();
        assert_eq!(changes, 1);
    }

    #[tokio::test]
    async fn add_station_persists_and_tunes_in() {
        let mut r = rig();
        let station = Station::new("New Wave", "http://example.com/newwave");
        cmd(&mut r.core, Command::AddStation { station: station.clone() }).await;
        let saved = radiola_core::state::load_stations_from_toml(&r.core.stations_path).unwrap();
        assert!(saved.iter().any(|s| s.url == station.url));
        assert_eq!(
            r.state.get_state().await.current_station.as_deref(),
            Some(station.id.as_str())
        );
        assert!(drain(&mut r.events)
            .iter()
            .any(|e| matches!(e, WindowEvent::StationsChanged)));
    }

    #[tokio::test]
    async fn shutdown_stops_loop() {
        let mut r = rig();
        assert!(!r.core.handle_event(CoreEvent::Shutdown).await);
    }
}
