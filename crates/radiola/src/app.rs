//! App: the terminal main window and its event loop.
//!
//! - `App` owns every component and the `AppState` they read from.
//! - A `tokio::mpsc` channel carries `AppMessage`s in from background tasks:
//!   terminal input, window events, window requests and worker results.
//! - Components return `Vec<Action>`; the App dispatches each one.
//! - Playback goes through the shared `Window` handle, exactly like plugins.

use std::collections::VecDeque;
use std::io::{self, Stdout, Write};
use std::time::Duration;

use ratatui::crossterm::{
    event::{
        self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
        Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Position, Rect},
    widgets::Block,
    Terminal,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use radiola_core::protocol::PlayerState;
use radiola_core::worker::Worker;

use crate::{
    action::{Action, ComponentId, Overlay},
    app_state::{AppState, PluginRow},
    component::Component,
    components::{
        help_overlay::HelpOverlay, history::History, log_panel::LogPanel,
        now_playing::NowPlaying, plugins_dialog::PluginsDialog,
        preferences_dialog::PreferencesDialog, search_dialog::SearchDialog,
        stations_popover::StationsPopover,
    },
    plugin::PluginManager,
    search::{DirectoryClient, SearchResult},
    theme::C_BG,
    widgets::{status_bar, toast::ToastManager},
    window::{Window, WindowEvent, WindowRequest},
};

type Tui = Terminal<CrosstermBackend<Stdout>>;

const NOW_PLAYING_HEIGHT: u16 = 10;
const LOG_PANEL_HEIGHT: u16 = 10;
const VOLUME_STEP: f64 = 0.05;

/// Messages flowing into the event loop.
pub enum AppMessage {
    Event(Event),
    StateUpdated(PlayerState),
    Log(String),
    Request(WindowRequest),
    SearchDone {
        generation: u64,
        result: Result<Vec<SearchResult>, String>,
    },
}

#[derive(Default)]
struct PaneAreas {
    history: Rect,
    log_panel: Rect,
}

pub struct App {
    window: Window,
    plugins: PluginManager,
    directory: Option<DirectoryClient>,
    requests: Option<mpsc::Receiver<WindowRequest>>,

    state: AppState,
    toast: ToastManager,
    worker: Option<Worker<AppMessage>>,

    now_playing: NowPlaying,
    history: History,
    log_panel: LogPanel,
    stations_popover: StationsPopover,
    search_dialog: SearchDialog,
    plugins_dialog: PluginsDialog,
    preferences_dialog: PreferencesDialog,
    help_overlay: HelpOverlay,

    /// Pane that gets non-global keys while no overlay is open.
    focus: ComponentId,
    areas: PaneAreas,
    /// The main window is hidden: the alternate screen is left and the
    /// loop waits for any key to show it again.
    hidden: bool,
    should_quit: bool,
}

impl App {
    pub fn new(
        window: Window,
        plugins: PluginManager,
        directory: Option<DirectoryClient>,
        requests: mpsc::Receiver<WindowRequest>,
    ) -> Self {
        Self {
            window,
            plugins,
            directory,
            requests: Some(requests),
            state: AppState::default(),
            toast: ToastManager::new(),
            worker: None,
            now_playing: NowPlaying::new(),
            history: History::new(),
            log_panel: LogPanel::new(),
            stations_popover: StationsPopover::new(),
            search_dialog: SearchDialog::new(),
            plugins_dialog: PluginsDialog::new(),
            preferences_dialog: PreferencesDialog::new(),
            help_overlay: HelpOverlay::new(),
            focus: ComponentId::History,
            areas: PaneAreas::default(),
            hidden: false,
            should_quit: false,
        }
    }

    /// Give the plugin manager back for shutdown once the loop ended.
    pub fn into_plugins(self) -> PluginManager {
        self.plugins
    }

    // ── Main run loop ─────────────────────────────────────────────────────────

    pub async fn run(&mut self) -> anyhow::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture, EnableFocusChange)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        debug!("run(): terminal created, size={:?}", terminal.size());

        let (tx, mut rx) = mpsc::channel::<AppMessage>(1024);
        self.worker = Some(Worker::new(tx.clone()));
        self.state.player = self.window.snapshot().await;
        self.refresh_plugin_rows();

        // ── Background task: keyboard/mouse/focus events ──────────────────────
        let event_tx = tx.clone();
        tokio::task::spawn_blocking(move || loop {
            match event::read() {
                Ok(ev) => {
                    if event_tx.blocking_send(AppMessage::Event(ev)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        });

        // ── Background task: window events → AppMessage ──────────────────────
        let mut events = self.window.subscribe();
        let bc_tx = tx.clone();
        let bc_window = self.window.clone();
        tokio::spawn(async move {
            loop {
                let msg = match events.recv().await {
                    Ok(WindowEvent::Log(line)) => AppMessage::Log(line),
                    Ok(_) => AppMessage::StateUpdated(bc_window.snapshot().await),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("window event receiver lagged by {} messages", n);
                        AppMessage::StateUpdated(bc_window.snapshot().await)
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if bc_tx.send(msg).await.is_err() {
                    break;
                }
            }
        });

        // ── Background task: window requests (hide, raise, quit) ──────────────
        if let Some(mut requests) = self.requests.take() {
            let req_tx = tx.clone();
            tokio::spawn(async move {
                while let Some(req) = requests.recv().await {
                    if req_tx.send(AppMessage::Request(req)).await.is_err() {
                        break;
                    }
                }
            });
        }

        // ── Periodic timers ───────────────────────────────────────────────────
        // Toast expiry and spinner animation.
        let mut toast_tick = tokio::time::interval(Duration::from_millis(100));
        toast_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // Component maintenance (search debounce).
        let mut ui_tick = tokio::time::interval(Duration::from_millis(100));
        ui_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("main window ready");

        // ── Main loop ─────────────────────────────────────────────────────────
        let mut needs_redraw = true;
        loop {
            if needs_redraw && !self.hidden {
                terminal.draw(|f| self.draw(f))?;
            }
            needs_redraw = false;

            if self.should_quit {
                break;
            }

            tokio::select! {
                Some(msg) = rx.recv() => {
                    needs_redraw = self.handle_message(msg, &mut terminal).await?;
                    const MAX_DRAIN: usize = 256;
                    let mut drained = 0usize;
                    while drained < MAX_DRAIN {
                        let Ok(next) = rx.try_recv() else { break };
                        drained += 1;
                        needs_redraw |= self.handle_message(next, &mut terminal).await?;
                    }
                }

                _ = ui_tick.tick() => {
                    let tick_actions = self.tick_overlay();
                    needs_redraw = !tick_actions.is_empty() || self.toast.has_spinner();
                    for action in tick_actions {
                        self.dispatch(action).await;
                    }
                }

                _ = toast_tick.tick() => {
                    if !self.toast.is_empty() {
                        self.toast.tick();
                        needs_redraw = true;
                    }
                }
            }
        }

        // ── Teardown ──────────────────────────────────────────────────────────
        disable_raw_mode()?;
        if !self.hidden {
            execute!(
                terminal.backend_mut(),
                LeaveAlternateScreen,
                DisableMouseCapture,
                DisableFocusChange
            )?;
        }
        terminal.show_cursor()?;
        Ok(())
    }

    /// Returns whether the frame needs redrawing.
    async fn handle_message(&mut self, msg: AppMessage, terminal: &mut Tui) -> anyhow::Result<bool> {
        match msg {
            AppMessage::Event(ev) => match ev {
                Event::Key(key) => {
                    if key.kind == KeyEventKind::Release {
                        return Ok(false);
                    }
                    if self.hidden {
                        // any key brings the window back
                        self.window.set_visible(true);
                        return Ok(false);
                    }
                    for action in self.handle_key(key) {
                        self.dispatch(action).await;
                    }
                }
                Event::Mouse(mouse) if !self.hidden => {
                    for action in self.handle_mouse(mouse) {
                        self.dispatch(action).await;
                    }
                }
                Event::FocusGained => self.window.set_active(true),
                Event::FocusLost => self.window.set_active(false),
                Event::Resize(_, _) => {}
                _ => return Ok(false),
            },

            AppMessage::StateUpdated(player) => {
                self.state.player = player;
                if self.state.overlay == Overlay::Stations {
                    self.stations_popover.sync_stations(&self.state.player.stations);
                }
            }

            AppMessage::Log(line) => self.state.push_log(line),

            AppMessage::Request(req) => self.handle_request(req, terminal)?,

            AppMessage::SearchDone { generation, result } => {
                self.toast.dismiss_spinner();
                if !self.search_dialog.apply_results(generation, result) {
                    debug!("dropped stale search results (generation {})", generation);
                }
            }
        }
        Ok(true)
    }

    fn handle_request(&mut self, req: WindowRequest, terminal: &mut Tui) -> anyhow::Result<()> {
        match req {
            WindowRequest::Quit => self.should_quit = true,
            WindowRequest::SetVisible(false) if !self.hidden => {
                execute!(
                    terminal.backend_mut(),
                    LeaveAlternateScreen,
                    DisableMouseCapture
                )?;
                let mut out = io::stdout();
                write!(out, "radiola is running in the background; press any key to show it\r\n")?;
                out.flush()?;
                self.hidden = true;
            }
            WindowRequest::SetVisible(true) | WindowRequest::Raise if self.hidden => {
                execute!(terminal.backend_mut(), EnterAlternateScreen, EnableMouseCapture)?;
                terminal.clear()?;
                self.hidden = false;
            }
            _ => {}
        }
        Ok(())
    }

    // ── Input ─────────────────────────────────────────────────────────────────

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Action> {
        if key.code == KeyCode::Char('c') && key.modifiers == KeyModifiers::CONTROL {
            return vec![Action::Quit];
        }

        // An open overlay captures every key.
        let s = &self.state;
        match s.overlay {
            Overlay::Stations => return self.stations_popover.handle_key(key, s),
            Overlay::Search => return self.search_dialog.handle_key(key, s),
            Overlay::Plugins => return self.plugins_dialog.handle_key(key, s),
            Overlay::Preferences => return self.preferences_dialog.handle_key(key, s),
            Overlay::Help => return self.help_overlay.handle_key(key, s),
            Overlay::None => {}
        }

        match key.code {
            KeyCode::Char(' ') => return vec![Action::PlayPause],
            KeyCode::Char('n') => return vec![Action::Next],
            KeyCode::Char('l') => return vec![Action::Love],
            KeyCode::Char('b') => return vec![Action::Ban],
            KeyCode::Char('t') => return vec![Action::Tired],
            KeyCode::Char('u') => return vec![Action::Unrate],
            KeyCode::Right | KeyCode::Char('+') | KeyCode::Char('=') => {
                return vec![Action::Volume((s.player.volume + VOLUME_STEP).min(1.0))];
            }
            KeyCode::Left | KeyCode::Char('-') => {
                return vec![Action::Volume((s.player.volume - VOLUME_STEP).max(0.0))];
            }
            KeyCode::Char('s') => return vec![Action::Open(Overlay::Stations)],
            KeyCode::Char('f') => return vec![Action::Open(Overlay::Search)],
            KeyCode::Char('p') => return vec![Action::Open(Overlay::Plugins)],
            KeyCode::Char('?') => return vec![Action::Open(Overlay::Help)],
            KeyCode::Char('L') => return vec![Action::ToggleLogs],
            KeyCode::Char('y') => {
                return match s.current_song() {
                    Some(song) => vec![Action::CopyToClipboard(song.display())],
                    None => vec![Action::Toast("nothing to copy".into())],
                };
            }
            KeyCode::Char('q') => return vec![Action::Close],
            KeyCode::Char('Q') => return vec![Action::Quit],
            KeyCode::Tab | KeyCode::BackTab if s.show_logs => {
                self.focus = match self.focus {
                    ComponentId::LogPanel => ComponentId::History,
                    _ => ComponentId::LogPanel,
                };
                return vec![];
            }
            _ => {}
        }

        match self.focus {
            ComponentId::LogPanel if s.show_logs => self.log_panel.handle_key(key, s),
            _ => self.history.handle_key(key, s),
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) -> Vec<Action> {
        if self.state.overlay != Overlay::None {
            return vec![];
        }
        let pos = Position::new(mouse.column, mouse.row);
        let s = &self.state;
        if self.areas.log_panel.contains(pos) {
            self.log_panel.handle_mouse(mouse, self.areas.log_panel, s)
        } else if self.areas.history.contains(pos) {
            self.history.handle_mouse(mouse, self.areas.history, s)
        } else {
            vec![]
        }
    }

    fn tick_overlay(&mut self) -> Vec<Action> {
        let s = &self.state;
        match s.overlay {
            Overlay::Search => self.search_dialog.tick(s),
            _ => Vec::new(),
        }
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    async fn dispatch(&mut self, action: Action) {
        let mut queue = VecDeque::from([action]);
        while let Some(action) = queue.pop_front() {
            // components see every action first
            let s = &self.state;
            queue.extend(self.history.on_action(&action, s));
            queue.extend(self.log_panel.on_action(&action, s));
            self.apply_action(action).await;
        }
    }

    async fn apply_action(&mut self, action: Action) {
        match action {
            // ── Playback ─────────────────────────────────────────────────────
            Action::PlayPause => self.window.playpause_notify().await,
            Action::Next => self.window.next_song().await,
            Action::Love => self.window.love_song().await,
            Action::Ban => self.window.ban_song().await,
            Action::Tired => self.window.tired_song().await,
            Action::Unrate => self.window.unrate_song().await,
            Action::Volume(v) => self.window.set_volume(v).await,
            Action::PlayStation(id) => self.window.set_station(&id).await,
            Action::AddStation(station) => {
                self.toast.success(format!("added {}", station.name));
                self.window.add_station(station).await;
            }

            // ── Overlays ─────────────────────────────────────────────────────
            Action::Open(overlay) => {
                match overlay {
                    Overlay::Stations => {
                        self.stations_popover.sync_stations(&self.state.player.stations);
                        self.stations_popover
                            .reset(self.state.player.current_station.as_deref());
                    }
                    Overlay::Search => self.search_dialog.reset(),
                    Overlay::Plugins => self.refresh_plugin_rows(),
                    _ => {}
                }
                self.state.overlay = overlay;
            }
            Action::CloseOverlay => {
                if self.state.overlay == Overlay::Search {
                    self.toast.dismiss_spinner();
                }
                self.state.overlay = Overlay::None;
            }
            Action::OpenPreferences(name) => {
                match self.plugins.get(&name).and_then(|entry| entry.preferences()) {
                    Some(items) => {
                        self.preferences_dialog.open(&name, items);
                        self.state.overlay = Overlay::Preferences;
                    }
                    None => self.toast.warning(format!("{} has no preferences", name)),
                }
            }

            // ── Plugins ──────────────────────────────────────────────────────
            Action::TogglePlugin(name) => {
                match self.plugins.toggle(&name).await {
                    Ok(true) => info!("plugin {} enabled", name),
                    Ok(false) => info!("plugin {} disabled", name),
                    Err(e) => self.toast.error(format!("{}: {}", name, e)),
                }
                self.refresh_plugin_rows();
                if let Some(err) = self.plugins.get(&name).and_then(|entry| entry.error()) {
                    self.toast.error(format!("{}: {}", name, err));
                }
            }
            Action::SetPreference { plugin, key, value } => {
                let Some(entry) = self.plugins.get_mut(&plugin) else {
                    return;
                };
                if let Err(e) = entry.set_preference(&key, value) {
                    warn!("{}: failed to apply {}: {}", plugin, key, e);
                    self.toast.error(format!("could not save {}", key));
                }
                if let Some(items) = entry.preferences() {
                    self.preferences_dialog.update(items);
                }
            }
            Action::ResetPreferences(plugin) => {
                let Some(entry) = self.plugins.get_mut(&plugin) else {
                    return;
                };
                match entry.reset_preferences() {
                    Ok(()) => self.toast.info(format!("{} preferences reset", plugin)),
                    Err(e) => self.toast.error(format!("reset failed: {}", e)),
                }
                if let Some(items) = entry.preferences() {
                    self.preferences_dialog.update(items);
                }
            }

            // ── Search ───────────────────────────────────────────────────────
            Action::Search { generation, query } => {
                self.start_search(generation, |client| async move { client.search(&query).await });
            }
            Action::SearchTag { generation, tag } => {
                self.start_search(generation, |client| async move { client.by_tag(&tag).await });
            }

            // ── UI ───────────────────────────────────────────────────────────
            Action::ToggleLogs => {
                self.state.show_logs = !self.state.show_logs;
                self.focus = if self.state.show_logs {
                    ComponentId::LogPanel
                } else {
                    ComponentId::History
                };
            }
            Action::CopyToClipboard(text) => {
                match arboard::Clipboard::new().and_then(|mut cb| cb.set_text(text.clone())) {
                    Ok(()) => {
                        let display = if text.chars().count() > 40 {
                            format!("{}…", text.chars().take(40).collect::<String>())
                        } else {
                            text
                        };
                        self.toast.success(format!("copied: {}", display));
                    }
                    Err(e) => {
                        warn!("clipboard: {}", e);
                        self.toast.error("clipboard unavailable");
                    }
                }
            }
            Action::Toast(message) => self.toast.info(message),

            // ── Window ───────────────────────────────────────────────────────
            Action::Close => self.window.request_close(),
            Action::Quit => self.window.quit(),
            Action::Noop => {}
        }
    }

    fn start_search<F, Fut>(&mut self, generation: u64, job: F)
    where
        F: FnOnce(DirectoryClient) -> Fut,
        Fut: std::future::Future<Output = Result<Vec<SearchResult>, crate::search::SearchError>>
            + Send
            + 'static,
    {
        let worker = match (&self.directory, &self.worker) {
            (Some(client), Some(worker)) => Some((client.clone(), worker.clone())),
            _ => None,
        };
        let Some((client, worker)) = worker else {
            self.search_dialog
                .apply_results(generation, Err("station search is unavailable".into()));
            return;
        };
        self.toast.spinner("Searching...");
        worker.send(job(client), move |result| AppMessage::SearchDone {
            generation,
            result: result.map_err(|e| e.to_string()),
        });
    }

    fn refresh_plugin_rows(&mut self) {
        self.state.plugins = self.plugins.entries().map(PluginRow::from_entry).collect();
    }

    // ── Rendering ─────────────────────────────────────────────────────────────

    fn draw(&mut self, frame: &mut ratatui::Frame) {
        let area = frame.area();
        frame.render_widget(
            Block::default().style(ratatui::style::Style::default().bg(C_BG)),
            area,
        );

        let log_h = if self.state.show_logs { LOG_PANEL_HEIGHT } else { 0 };
        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(NOW_PLAYING_HEIGHT),
                Constraint::Min(0),
                Constraint::Length(log_h),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(area);

        let s = &self.state;
        let no_overlay = s.overlay == Overlay::None;
        self.now_playing.draw(frame, outer[0], false, s);

        let history_focused = no_overlay && self.focus == ComponentId::History;
        self.history.draw(frame, outer[1], history_focused, s);
        self.areas.history = outer[1];

        if s.show_logs {
            let log_focused = no_overlay && self.focus == ComponentId::LogPanel;
            self.log_panel.draw(frame, outer[2], log_focused, s);
            self.areas.log_panel = outer[2];
        } else {
            self.areas.log_panel = Rect::default();
        }

        status_bar::draw_separator(frame, outer[3]);
        status_bar::draw_log_bar(
            frame,
            outer[4],
            s.logs.last().map(String::as_str),
            &s.player.mpv_health,
        );
        status_bar::draw_keys_bar(frame, outer[5], s.overlay);

        match s.overlay {
            Overlay::Stations => self.stations_popover.draw(frame, area, true, s),
            Overlay::Search => self.search_dialog.draw(frame, area, true, s),
            Overlay::Plugins => self.plugins_dialog.draw(frame, area, true, s),
            Overlay::Preferences => self.preferences_dialog.draw(frame, area, true, s),
            Overlay::Help => self.help_overlay.draw(frame, area, true, s),
            Overlay::None => {}
        }

        self.toast.draw(frame, area);
    }
}
