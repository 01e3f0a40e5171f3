//! mpv JSON IPC driver.
//!
//! ```text
//!   MpvDriver::spawn_and_connect()
//!         │
//!         ├── writer_task   ← PendingRequest via mpsc → socket
//!         └── reader_task   ← JSON lines from socket
//!                                ├── reply (request_id) → oneshot
//!                                └── event              → event_tx
//! ```
//!
//! Unix uses a domain socket, Windows a named pipe.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use radiola_core::platform;

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

/// Fixed observe_property ids, matched in property-change events.
pub const OBS_CORE_IDLE: u64 = 1;
pub const OBS_PAUSE: u64 = 2;
pub const OBS_ICY_TITLE: u64 = 3;
pub const OBS_TIME_POS: u64 = 4;
pub const OBS_ICY_TITLE_DIRECT: u64 = 6;

const IPC_TIMEOUT: Duration = Duration::from_secs(5);

type Reply = oneshot::Sender<anyhow::Result<Value>>;
type PendingMap = Arc<Mutex<HashMap<u64, Reply>>>;

struct PendingRequest {
    req_id: u64,
    payload: String,
    reply: Reply,
}

/// Unsolicited mpv message (event or property change).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// `(observe id, data)` for property-change events.
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.event_name()? != "property-change" {
            return None;
        }
        let id = self.raw.get("id")?.as_u64()?;
        Some((id, self.raw.get("data").unwrap_or(&Value::Null)))
    }

    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }
}

#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let mut payload = serde_json::to_string(&json!({ "command": command, "request_id": req_id }))?;
        payload.push('\n');

        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload,
                reply,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(IPC_TIMEOUT, reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    pub async fn load_stream(&self, url: &str, volume: f64) -> anyhow::Result<()> {
        debug!("mpv: loadfile {}", url);
        self.send(json!(["loadfile", url])).await?;
        let _ = self.set_volume(volume).await;
        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        let _ = self.send(json!(["stop"])).await;
        Ok(())
    }

    /// `volume` is linear 0..1.
    pub async fn set_volume(&self, volume: f64) -> anyhow::Result<()> {
        let pct = (volume * 100.0).clamp(0.0, 100.0);
        self.send(json!(["set_property", "volume", pct])).await?;
        Ok(())
    }

    pub async fn set_pause(&self, paused: bool) -> anyhow::Result<()> {
        self.send(json!(["set_property", "pause", paused])).await?;
        Ok(())
    }

    /// Must run after every fresh connection.
    pub async fn observe_all_properties(&self) {
        let props = [
            (OBS_CORE_IDLE, "core-idle"),
            (OBS_PAUSE, "pause"),
            (OBS_ICY_TITLE, "metadata/by-key/icy-title"),
            (OBS_TIME_POS, "time-pos"),
            (OBS_ICY_TITLE_DIRECT, "icy-title"),
        ];
        for (id, name) in props {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }
}

/// Owns the mpv child process.
pub struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
    pub last_volume: f64,
}

impl MpvDriver {
    pub fn new() -> Self {
        Self {
            socket_name: platform::mpv_socket_name(),
            process: None,
            last_volume: 0.5,
        }
    }

    pub fn process_alive(&mut self) -> bool {
        let Some(child) = self.process.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!("mpv process exited: {}", status);
                false
            }
            Err(e) => {
                warn!("mpv process_alive check failed: {}", e);
                false
            }
        }
    }

    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;
        #[cfg(unix)]
        let _ = tokio::fs::remove_file(&self.socket_name).await;

        let mpv_binary =
            platform::find_mpv_binary().ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;
        let stderr_path = platform::data_dir().join("mpv-stderr.log");
        let stderr_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&stderr_path)?;

        let child = tokio::process::Command::new(&mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg("--quiet")
            .arg(platform::mpv_socket_arg())
            .arg(format!(
                "--volume={}",
                (self.last_volume * 100.0).clamp(0.0, 100.0).round() as i64
            ))
            .stdout(std::process::Stdio::null())
            .stderr(stderr_file)
            .kill_on_drop(true)
            .spawn()?;
        info!("mpv: spawned pid {:?}, stderr → {}", child.id(), stderr_path.display());
        self.process = Some(child);

        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Some(handle) = self.connect(event_tx.clone()).await {
                return Ok(handle);
            }
        }
        anyhow::bail!("mpv IPC endpoint did not appear")
    }

    /// Connect to an already-running mpv without spawning.
    pub async fn try_reconnect(&mut self, event_tx: mpsc::Sender<MpvEvent>) -> Option<MpvHandle> {
        let handle = self.connect(event_tx).await?;
        info!("mpv: reconnected to existing IPC endpoint");
        Some(handle)
    }

    #[cfg(unix)]
    async fn connect(&self, event_tx: mpsc::Sender<MpvEvent>) -> Option<MpvHandle> {
        let stream = tokio::net::UnixStream::connect(&self.socket_name).await.ok()?;
        let (read, write) = stream.into_split();
        Some(start_io_tasks(read, write, event_tx))
    }

    #[cfg(windows)]
    async fn connect(&self, event_tx: mpsc::Sender<MpvEvent>) -> Option<MpvHandle> {
        use tokio::net::windows::named_pipe::ClientOptions;
        let pipe = ClientOptions::new()
            .open(format!(r"\\.\pipe\{}", self.socket_name))
            .ok()?;
        let (read, write) = tokio::io::split(pipe);
        Some(start_io_tasks(read, write, event_tx))
    }
}

fn start_io_tasks<R, W>(read: R, write: W, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (tx, rx) = mpsc::channel::<PendingRequest>(64);
    tokio::spawn(writer_task(write, rx, pending.clone()));
    tokio::spawn(reader_task(BufReader::new(read), pending, event_tx));
    MpvHandle { tx }
}

async fn fail_all(pending: &PendingMap, reason: &str) {
    for (_, tx) in pending.lock().await.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<MpvEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_all(&pending, "mpv IPC connection closed").await;
                break;
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_all(&pending, "mpv IPC read error").await;
                break;
            }
            Ok(_) => {}
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let val: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                continue;
            }
        };

        match val.get("request_id").and_then(Value::as_u64) {
            Some(req_id) => {
                let Some(tx) = pending.lock().await.remove(&req_id) else {
                    debug!("mpv reader: reply for unknown req={}", req_id);
                    continue;
                };
                let result = match val["error"].as_str() {
                    Some("success") => Ok(val),
                    other => Err(anyhow::anyhow!("mpv error: {}", other.unwrap_or("unknown error"))),
                };
                let _ = tx.send(result);
            }
            None => {
                let _ = event_tx.send(MpvEvent { raw: val }).await;
            }
        }
    }
}

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // register before writing so the reader can match the reply
        pending.lock().await.insert(req.req_id, req.reply);
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

    #[test]
    fn property_change_parsing() {
        let evt = MpvEvent {
            raw: json!({"event": "property-change", "id": 3, "name": "x", "data": "A - B"}),
        };
        let (id, data) = evt.as_property_change().unwrap();
        assert_eq!(id, OBS_ICY_TITLE);
        assert_eq!(data.as_str(), Some("A - B"));

        let evt = MpvEvent {
            raw: json!({"event": "end-file", "reason": "eof"}),
        };
        assert!(evt.as_property_change().is_none());
        assert_eq!(evt.event_name(), Some("end-file"));
    }

    #[tokio::test]
    async fn replies_and_events_are_routed() {
        let (client, server) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client);
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let handle = start_io_tasks(client_read, client_write, event_tx);

        // fake mpv: answer each request, then push an event
        tokio::spawn(async move {
            let (server_read, mut server_write) = tokio::io::split(server);
            let mut lines = BufReader::new(server_read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let req: Value = serde_json::from_str(&line).unwrap();
                let reply = json!({"request_id": req["request_id"], "error": "success", "data": 42});
                let event = json!({"event": "property-change", "id": OBS_PAUSE, "data": true});
                server_write
                    .write_all(format!("{}\n{}\n", reply, event).as_bytes())
                    .await
                    .unwrap();
            }
        });

        let resp = handle.send(json!(["get_property", "volume"])).await.unwrap();
        assert_eq!(resp["data"], 42);
        let evt = event_rx.recv().await.unwrap();
        assert_eq!(evt.as_property_change().map(|(id, _)| id), Some(OBS_PAUSE));
    }

    #[tokio::test]
    async fn error_reply_becomes_err() {
        let (client, server) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client);
        let (event_tx, _event_rx) = mpsc::channel(8);
        let handle = start_io_tasks(client_read, client_write, event_tx);

        tokio::spawn(async move {
            let (server_read, mut server_write) = tokio::io::split(server);
            let mut lines = BufReader::new(server_read).lines();
            if let Ok(Some(line)) = lines.next_line().await {
                let req: Value = serde_json::from_str(&line).unwrap();
                let reply = json!({"request_id": req["request_id"], "error": "property unavailable"});
                server_write.write_all(format!("{}\n", reply).as_bytes()).await.unwrap();
            }
        });

        let err = handle.send(json!(["get_property", "nope"])).await.unwrap_err();
        assert!(err.to_string().contains("property unavailable"));
    }
}
