//! MPRIS2 remote control over the session bus.

mod service;

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use radiola_core::settings::SettingsHandle;

use crate::plugin::{Plugin, PluginContext, PluginError};
use crate::window::{Window, WindowEvent};

use service::{to_mpris_volume, PlayerIface, PlaylistsIface, RootIface, BUS_NAME, OBJECT_PATH};

pub struct MprisPlugin {
    window: Window,
    conn: Option<zbus::Connection>,
    task: Option<JoinHandle<()>>,
}

impl MprisPlugin {
    pub fn create(ctx: &PluginContext) -> Box<dyn Plugin> {
        Box::new(Self {
            window: ctx.window.clone(),
            conn: None,
            task: None,
        })
    }
}

#[async_trait]
impl Plugin for MprisPlugin {
    fn name(&self) -> &'static str {
        "mpris"
    }

    fn description(&self) -> &'static str {
        "Allows control with external programs"
    }

    fn default_enabled(&self) -> bool {
        true
    }

    async fn prepare(&mut self, _settings: &SettingsHandle) -> Result<(), PluginError> {
        zbus::Connection::session().await.map(drop).map_err(|e| {
            warn!("No session bus for MPRIS: {}", e);
            PluginError::Unavailable("D-Bus session bus not available".into())
        })
    }

    async fn enable(&mut self, _settings: &SettingsHandle) -> anyhow::Result<()> {
        let conn = zbus::connection::Builder::session()?
            .name(BUS_NAME)?
            .serve_at(
                OBJECT_PATH,
                RootIface {
                    window: self.window.clone(),
                },
            )?
            .serve_at(OBJECT_PATH, PlayerIface::new(self.window.clone()).await)?
            .serve_at(
                OBJECT_PATH,
                PlaylistsIface {
                    window: self.window.clone(),
                },
            )?
            .build()
            .await?;
        debug!("MPRIS service registered as {}", BUS_NAME);

        let mut events = self.window.subscribe();
        let window = self.window.clone();
        let task_conn = conn.clone();
        self.task = Some(tokio::spawn(async move {
            loop {
                let evt = match events.recv().await {
                    Ok(evt) => evt,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                };
                if let Err(e) = forward(&task_conn, &window, evt).await {
                    warn!("MPRIS signal failed: {}", e);
                }
            }
        }));
        self.conn = Some(conn);
        Ok(())
    }

    async fn disable(&mut self) -> anyhow::Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        // dropping the connection releases the bus name
        self.conn = None;
        Ok(())
    }
}

/// Translate window events into `PropertiesChanged` and playlist signals.
async fn forward(conn: &zbus::Connection, window: &Window, evt: WindowEvent) -> zbus::Result<()> {
    let server = conn.object_server();
    match evt {
        WindowEvent::MetadataChanged(song) => {
            let is_current = window
                .current_song()
                .await
                .is_some_and(|current| current.index == song.index);
            if is_current {
                let iface = server.interface::<_, PlayerIface>(OBJECT_PATH).await?;
                iface.get().await.metadata_changed(iface.signal_context()).await?;
            }
        }
        WindowEvent::PlayStateChanged(status) => {
            let iface = server.interface::<_, PlayerIface>(OBJECT_PATH).await?;
            let mut player = iface.get_mut().await;
            if player.status.mpris_label() != status.mpris_label() {
                player.status = status;
                player.playback_status_changed(iface.signal_context()).await?;
            } else {
                player.status = status;
            }
        }
        WindowEvent::VolumeChanged(linear) => {
            let volume = to_mpris_volume(linear);
            let iface = server.interface::<_, PlayerIface>(OBJECT_PATH).await?;
            let mut player = iface.get_mut().await;
            if (player.volume - volume).abs() > f64::EPSILON {
                player.volume = volume;
                player.volume_changed(iface.signal_context()).await?;
            }
        }
        WindowEvent::StationChanged(station) => {
            let iface = server.interface::<_, PlaylistsIface>(OBJECT_PATH).await?;
            iface.get().await.active_playlist_changed(iface.signal_context()).await?;
            if let Some(playlist) = service::playlist(&station) {
                PlaylistsIface::playlist_changed(iface.signal_context(), playlist).await?;
            }
        }
        WindowEvent::StationsChanged => {
            let iface = server.interface::<_, PlaylistsIface>(OBJECT_PATH).await?;
            iface.get().await.playlist_count_changed(iface.signal_context()).await?;
        }
        _ => {}
    }
    Ok(())
}
