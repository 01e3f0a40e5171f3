//! Desktop notifications on song change.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zbus::zvariant::Value;

use radiola_core::platform::APP_ID;
use radiola_core::protocol::Song;
use radiola_core::settings::SettingsHandle;

use crate::plugin::{Plugin, PluginContext, PluginError, PrefItem, PrefValue};
use crate::window::{Window, WindowEvent};

#[zbus::proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
    fn get_capabilities(&self) -> zbus::Result<Vec<String>>;

    fn get_server_information(&self) -> zbus::Result<(String, String, String, String)>;

    #[allow(clippy::too_many_arguments)]
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: &[&str],
        hints: HashMap<&str, Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;

    #[zbus(signal)]
    fn notification_closed(&self, id: u32, reason: u32) -> zbus::Result<()>;

    #[zbus(signal)]
    fn action_invoked(&self, id: u32, action_key: String) -> zbus::Result<()>;
}

const PAUSE_ACTION: &str = "media-playback-pause";
const PLAY_ACTION: &str = "media-playback-start";
const SKIP_ACTION: &str = "media-skip-forward";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyPrefs {
    pub actions: bool,
    #[serde(rename = "action-icons")]
    pub action_icons: bool,
    pub persistence: bool,
}

impl Default for NotifyPrefs {
    fn default() -> Self {
        Self {
            actions: true,
            action_icons: true,
            persistence: true,
        }
    }
}

/// What the notification server told us about itself.
#[derive(Debug, Clone, Default)]
struct Server {
    caps: Vec<String>,
}

impl Server {
    fn has(&self, cap: &str) -> bool {
        self.caps.iter().any(|c| c == cap)
    }
}

pub struct NotifyPlugin {
    window: Window,
    proxy: Option<NotificationsProxy<'static>>,
    server: Server,
    task: Option<JoinHandle<()>>,
}

impl NotifyPlugin {
    pub fn create(ctx: &PluginContext) -> Box<dyn Plugin> {
        Box::new(Self {
            window: ctx.window.clone(),
            proxy: None,
            server: Server::default(),
            task: None,
        })
    }
}

async fn connect() -> zbus::Result<NotificationsProxy<'static>> {
    let conn = zbus::Connection::session().await?;
    NotificationsProxy::new(&conn).await
}

#[async_trait]
impl Plugin for NotifyPlugin {
    fn name(&self) -> &'static str {
        "notify"
    }

    fn description(&self) -> &'static str {
        "Shows notifications on song change"
    }

    async fn prepare(&mut self, _settings: &SettingsHandle) -> Result<(), PluginError> {
        let proxy = match connect().await {
            Ok(p) => p,
            Err(e) => {
                warn!("Notification server not found: {}", e);
                return Err(PluginError::Unavailable("Notification server not found".into()));
            }
        };
        let caps = match proxy.get_capabilities().await {
            Ok(caps) => caps,
            Err(e) => {
                warn!("Notification server not found: {}", e);
                return Err(PluginError::Unavailable("Notification server not found".into()));
            }
        };
        if let Ok((name, vendor, version, spec_version)) = proxy.get_server_information().await {
            debug!(
                "Notification Server Information: name={} vendor={} version={} spec={}",
                name, vendor, version, spec_version
            );
        }
        debug!("Notification Server Capabilities: {}", caps.join(", "));

        self.server = Server { caps };
        self.proxy = Some(proxy);
        Ok(())
    }

    async fn enable(&mut self, settings: &SettingsHandle) -> anyhow::Result<()> {
        let Some(proxy) = self.proxy.clone() else {
            return Ok(());
        };
        let mut closed = proxy.receive_notification_closed().await?;
        let mut invoked = proxy.receive_action_invoked().await?;
        let mut events = self.window.subscribe();
        let window = self.window.clone();
        let server = self.server.clone();
        let settings = settings.clone();

        self.task = Some(tokio::spawn(async move {
            let mut last_id = 0u32;
            loop {
                tokio::select! {
                    evt = events.recv() => match evt {
                        Ok(WindowEvent::SongChanged(song)) => {
                            last_id = show(&proxy, &window, &server, &settings, Some(song), None, last_id).await;
                        }
                        Ok(WindowEvent::UserChangedPlayState { playing }) => {
                            // the core reports the new state later; trust the event
                            last_id = show(&proxy, &window, &server, &settings, None, Some(playing), last_id).await;
                        }
                        Ok(_) | Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    },
                    Some(signal) = closed.next() => {
                        if let Ok(args) = signal.args() {
                            debug!("{}", close_reason(*args.reason()));
                        }
                    }
                    Some(signal) = invoked.next() => {
                        let Ok(args) = signal.args() else { continue };
                        debug!("Notification action invoked: {}", args.action_key());
                        if *args.id() != last_id {
                            continue;
                        }
                        if args.action_key().starts_with(SKIP_ACTION) {
                            window.next_song().await;
                        } else {
                            window.playpause_notify().await;
                        }
                    }
                }
            }
        }));
        Ok(())
    }

    async fn disable(&mut self) -> anyhow::Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }

    fn preferences(&self, settings: &SettingsHandle) -> Option<Vec<PrefItem>> {
        let prefs: NotifyPrefs = settings.load_data();
        let items: Vec<PrefItem> = [
            ("action-icons", "Icons in notification action buttons", prefs.action_icons),
            ("actions", "Action buttons in notifications", prefs.actions),
            ("persistence", "Notifications are retained until closed", prefs.persistence),
        ]
        .into_iter()
        .filter(|(key, _, _)| self.server.has(key))
        .map(|(key, label, value)| PrefItem::toggle(key, label, value))
        .collect();
        (!items.is_empty()).then_some(items)
    }

    fn set_preference(
        &mut self,
        settings: &SettingsHandle,
        key: &str,
        value: PrefValue,
    ) -> anyhow::Result<()> {
        let PrefValue::Bool(value) = value else {
            return Ok(());
        };
        let mut prefs: NotifyPrefs = settings.load_data();
        match key {
            "actions" => prefs.actions = value,
            "action-icons" => prefs.action_icons = value,
            "persistence" => prefs.persistence = value,
            _ => return Ok(()),
        }
        settings.store_data(&prefs)
    }

    fn reset_preferences(&mut self, settings: &SettingsHandle) -> anyhow::Result<()> {
        settings.store_data(&NotifyPrefs::default())
    }
}

/// What a notification shows.
struct Notice {
    song: Song,
    actions: Vec<(String, String)>,
}

/// `None` while the window has focus or nothing is playing.  `playing`
/// overrides the state read from the window.
async fn compose(
    window: &Window,
    server: &Server,
    prefs: &NotifyPrefs,
    song: Option<Song>,
    playing: Option<bool>,
) -> Option<Notice> {
    if window.is_active() {
        return None;
    }
    let song = match song {
        Some(s) => s,
        None => window.current_song().await?,
    };
    let actions = if server.has("actions") && prefs.actions {
        let playing = match playing {
            Some(p) => p,
            None => window.playing().await,
        };
        notification_actions(playing, is_rtl_locale())
    } else {
        Vec::new()
    };
    Some(Notice { song, actions })
}

/// Show (or replace) the notification; returns the id to replace next time.
async fn show(
    proxy: &NotificationsProxy<'static>,
    window: &Window,
    server: &Server,
    settings: &SettingsHandle,
    song: Option<Song>,
    playing: Option<bool>,
    last_id: u32,
) -> u32 {
    let prefs: NotifyPrefs = settings.load_data();
    let Some(Notice { song, actions }) = compose(window, server, &prefs, song, playing).await else {
        return last_id;
    };
    let action_refs: Vec<&str> = actions
        .iter()
        .flat_map(|(key, label)| [key.as_str(), label.as_str()])
        .collect();

    let body = notification_body(&song, server.has("body-markup"));
    let icon = song.art_url.as_deref().unwrap_or("audio-x-generic");
    match proxy
        .notify(
            "Radiola",
            last_id,
            icon,
            &song.title,
            &body,
            &action_refs,
            hints(server, &prefs),
            -1,
        )
        .await
    {
        Ok(id) => id,
        Err(e) => {
            warn!("Failed to show notification: {}", e);
            last_id
        }
    }
}

fn hints(server: &Server, prefs: &NotifyPrefs) -> HashMap<&'static str, Value<'static>> {
    let mut hints = HashMap::new();
    hints.insert("desktop-entry", Value::from(APP_ID));
    hints.insert("category", Value::from("x-gnome.music"));
    if server.has("action-icons") && prefs.action_icons {
        hints.insert("action-icons", Value::from(true));
    }
    // persistent servers keep notifications unless told otherwise
    if server.has("persistence") && !prefs.persistence {
        hints.insert("transient", Value::from(true));
    }
    hints
}

pub(crate) fn notification_body(song: &Song, markup: bool) -> String {
    let body = if song.album.is_empty() {
        format!("by {}", song.artist)
    } else {
        format!("by {} from {}", song.artist, song.album)
    };
    if markup {
        escape_markup(&body)
    } else {
        body
    }
}

fn escape_markup(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `(key, label)` pairs; keys double as icon names.
pub(crate) fn notification_actions(playing: bool, rtl: bool) -> Vec<(String, String)> {
    let suffix = if rtl { "-rtl" } else { "" };
    let first = if playing {
        (PAUSE_ACTION.to_string(), "Pause".to_string())
    } else {
        (format!("{PLAY_ACTION}{suffix}"), "Play".to_string())
    };
    vec![first, (format!("{SKIP_ACTION}{suffix}"), "Skip".to_string())]
}

fn is_rtl_locale() -> bool {
    let lang = std::env::var("LC_ALL")
        .or_else(|_| std::env::var("LC_MESSAGES"))
        .or_else(|_| std::env::var("LANG"))
        .unwrap_or_default();
    ["ar", "he", "fa", "ur", "yi", "ps"]
        .iter()
        .any(|prefix| lang.starts_with(prefix))
}

fn close_reason(reason: u32) -> &'static str {
    match reason {
        1 => "The notification expired.",
        2 => "The notification was dismissed by the user.",
        3 => "The notification was closed by a call to CloseNotification.",
        _ => "The notification was closed by undefined/reserved reasons.",
    }
}
