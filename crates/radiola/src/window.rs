//! The player window as seen by plugins.
//!
//! `Window` is the hub between the UI loop, the playback core and the
//! plugins.  It exposes read access to player state, forwards playback
//! requests to the core, forwards window-management requests (raise, hide,
//! quit) to the UI loop, and fans out [`WindowEvent`]s on a broadcast
//! channel.  Subscribing is `subscribe()`; unsubscribing is dropping (or
//! aborting the task that drains) the receiver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use radiola_core::protocol::{Command, PlaybackStatus, PlayerState, Rating, Song, Station};
use radiola_core::state::StateManager;

use crate::core::CoreEvent;

#[derive(Debug, Clone)]
pub enum WindowEvent {
    /// A new song started.
    SongChanged(Song),
    /// The user (not a remote control) toggled playback.
    UserChangedPlayState { playing: bool },
    /// Rating, art or other metadata of a song changed.
    MetadataChanged(Song),
    PlayStateChanged(PlaybackStatus),
    /// Linear 0..1.
    VolumeChanged(f64),
    /// A song started without cover art.
    NoArtUrl(Song),
    StationChanged(Station),
    StationsChanged,
    VisibilityChanged(bool),
    /// Anything else in the state snapshot changed.
    StateUpdated,
    Log(String),
}

/// Requests handled by the UI loop.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowRequest {
    Raise,
    SetVisible(bool),
    Quit,
}

struct Flags {
    active: AtomicBool,
    visible: AtomicBool,
    close_hides: AtomicBool,
}

#[derive(Clone)]
pub struct Window {
    state: Arc<StateManager>,
    events: broadcast::Sender<WindowEvent>,
    core_tx: mpsc::Sender<CoreEvent>,
    ui_tx: mpsc::Sender<WindowRequest>,
    flags: Arc<Flags>,
}

impl Window {
    pub fn new(
        state: Arc<StateManager>,
        events: broadcast::Sender<WindowEvent>,
        core_tx: mpsc::Sender<CoreEvent>,
        ui_tx: mpsc::Sender<WindowRequest>,
    ) -> Self {
        Self {
            state,
            events,
            core_tx,
            ui_tx,
            flags: Arc::new(Flags {
                active: AtomicBool::new(true),
                visible: AtomicBool::new(true),
                close_hides: AtomicBool::new(false),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WindowEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: WindowEvent) {
        let _ = self.events.send(event);
    }

    pub fn state_manager(&self) -> &Arc<StateManager> {
        &self.state
    }

    // ── state ──────────────────────────────────────────────────────────────

    pub async fn snapshot(&self) -> PlayerState {
        self.state.get_state().await
    }

    pub async fn current_song(&self) -> Option<Song> {
        self.state.current_song().await
    }

    pub async fn current_station(&self) -> Option<Station> {
        self.snapshot().await.current_station().cloned()
    }

    pub async fn stations(&self) -> Vec<Station> {
        self.state.stations().await
    }

    pub async fn playback_status(&self) -> PlaybackStatus {
        self.snapshot().await.playback_status
    }

    /// Playing or about to play.
    pub async fn playing(&self) -> bool {
        matches!(
            self.playback_status().await,
            PlaybackStatus::Playing | PlaybackStatus::Connecting
        )
    }

    /// True while a station is still connecting.
    pub async fn waiting_for_playlist(&self) -> bool {
        self.playback_status().await == PlaybackStatus::Connecting
    }

    pub async fn volume(&self) -> f64 {
        self.snapshot().await.volume
    }

    pub async fn position_secs(&self) -> Option<f64> {
        self.snapshot().await.time_pos_secs
    }

    // ── window flags ───────────────────────────────────────────────────────

    /// The window has input focus.  A hidden window never has.
    pub fn is_active(&self) -> bool {
        self.is_visible() && self.flags.active.load(Ordering::Relaxed)
    }

    pub fn set_active(&self, active: bool) {
        self.flags.active.store(active, Ordering::Relaxed);
    }

    pub fn is_visible(&self) -> bool {
        self.flags.visible.load(Ordering::Relaxed)
    }

    pub fn set_visible(&self, visible: bool) {
        if self.flags.visible.swap(visible, Ordering::Relaxed) != visible {
            debug!("window visible → {}", visible);
            self.request(WindowRequest::SetVisible(visible));
            self.emit(WindowEvent::VisibilityChanged(visible));
        }
    }

    /// Whether a close request hides the window instead of quitting.
    pub fn close_hides(&self) -> bool {
        self.flags.close_hides.load(Ordering::Relaxed)
    }

    pub fn set_close_hides(&self, hides: bool) {
        self.flags.close_hides.store(hides, Ordering::Relaxed);
    }

    /// Close button semantics: hide when a plugin asked for it, else quit.
    pub fn request_close(&self) {
        if self.close_hides() {
            self.set_visible(false);
        } else {
            self.quit();
        }
    }

    pub fn bring_to_top(&self) {
        self.set_visible(true);
        self.request(WindowRequest::Raise);
    }

    pub fn quit(&self) {
        self.request(WindowRequest::Quit);
    }

    fn request(&self, req: WindowRequest) {
        if let Err(e) = self.ui_tx.try_send(req) {
            warn!("window request dropped: {}", e);
        }
    }

    // ── playback ───────────────────────────────────────────────────────────

    async fn command(&self, cmd: Command) {
        if self.core_tx.send(CoreEvent::Command(cmd)).await.is_err() {
            warn!("playback core is gone");
        }
    }

    pub async fn play(&self) {
        self.command(Command::Play).await;
    }

    pub async fn pause(&self) {
        self.command(Command::Pause).await;
    }

    pub async fn playpause(&self) {
        self.command(Command::PlayPause).await;
    }

    pub async fn stop(&self) {
        self.command(Command::Stop).await;
    }

    pub async fn user_play(&self) {
        self.play().await;
        self.emit(WindowEvent::UserChangedPlayState { playing: true });
    }

    pub async fn user_pause(&self) {
        self.pause().await;
        self.emit(WindowEvent::UserChangedPlayState { playing: false });
    }

    /// Toggle playback and tell listeners the user did it.
    pub async fn playpause_notify(&self) {
        if self.playing().await {
            self.user_pause().await;
        } else {
            self.user_play().await;
        }
    }

    pub async fn next_song(&self) {
        self.command(Command::Next).await;
    }

    pub async fn love_song(&self) {
        self.command(Command::Rate {
            rating: Rating::Love,
        })
        .await;
    }

    pub async fn ban_song(&self) {
        self.command(Command::Rate { rating: Rating::Ban }).await;
    }

    pub async fn tired_song(&self) {
        self.command(Command::Tired).await;
    }

    pub async fn unrate_song(&self) {
        self.command(Command::Unrate).await;
    }

    /// Linear 0..1.
    pub async fn set_volume(&self, value: f64) {
        self.command(Command::Volume {
            value: value.clamp(0.0, 1.0),
        })
        .await;
    }

    pub async fn set_station(&self, id: &str) {
        self.command(Command::PlayStation { id: id.to_string() }).await;
    }

    pub async fn add_station(&self, station: Station) {
        self.command(Command::AddStation { station }).await;
    }

    pub async fn set_song_art(&self, index: u64, url: &str) {
        self.command(Command::SetSongArt {
            index,
            url: url.to_string(),
        })
        .await;
    }
}
