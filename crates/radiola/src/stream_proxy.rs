//! Local HTTP relay in front of station streams.
//!
//! mpv always plays `http://127.0.0.1:<port>/stream/<station id>`.  The relay
//! opens one upstream connection per station (ICY metadata requested, basic
//! auth added for stations that need the account, upstream proxy applied)
//! and fans the bytes out to every subscriber.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use radiola_core::net;
use radiola_core::secrets::SecretService;
use radiola_core::state::StateManager;

const RELAY_CAPACITY: usize = 4096;
/// Upstream is closed after this long without subscribers.
const IDLE_GRACE: Duration = Duration::from_secs(2);

/// Credentials for stations with `requires_auth`.
#[derive(Clone)]
pub struct Account {
    pub email: String,
    pub secrets: SecretService,
}

#[derive(Clone)]
struct RelayState {
    state_manager: Arc<StateManager>,
    client: Client,
    account: Option<Account>,
    streams: Arc<Mutex<HashMap<String, Arc<SharedStream>>>>,
}

struct SharedStream {
    headers: HeaderMap,
    tx: broadcast::Sender<Bytes>,
}

impl RelayState {
    /// Shared stream for `id` plus a receiver subscribed before any byte is
    /// pumped.
    async fn subscribe(
        &self,
        id: &str,
    ) -> Result<(Arc<SharedStream>, broadcast::Receiver<Bytes>), StatusCode> {
        if let Some(existing) = self.streams.lock().await.get(id).cloned() {
            debug!(
                "relay: reusing stream {} ({} receivers)",
                id,
                existing.tx.receiver_count()
            );
            let rx = existing.tx.subscribe();
            return Ok((existing, rx));
        }

        let station = self
            .state_manager
            .station(id)
            .await
            .filter(|s| !s.url.is_empty())
            .ok_or(StatusCode::NOT_FOUND)?;
        info!("relay: opening upstream for {} → {}", station.name, station.url);

        let mut request = self.client.get(&station.url);
        if station.requires_auth {
            match &self.account {
                Some(account) if !account.email.is_empty() => {
                    let password = account.secrets.get_account_password_async(&account.email).await;
                    request = request.basic_auth(&account.email, Some(password));
                }
                _ => warn!("relay: {} requires an account but none is configured", station.name),
            }
        }

        let upstream = request.send().await.map_err(|e| {
            error!("relay: upstream connect failed for {}: {}", station.name, e);
            StatusCode::BAD_GATEWAY
        })?;
        if !upstream.status().is_success() {
            error!("relay: upstream returned {} for {}", upstream.status(), station.url);
            return Err(match upstream.status().as_u16() {
                401 | 403 => StatusCode::UNAUTHORIZED,
                _ => StatusCode::BAD_GATEWAY,
            });
        }

        let (tx, rx) = broadcast::channel::<Bytes>(RELAY_CAPACITY);
        let shared = Arc::new(SharedStream {
            headers: upstream.headers().clone(),
            tx,
        });
        self.streams.lock().await.insert(id.to_string(), shared.clone());

        let streams = self.streams.clone();
        let pump = shared.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            let mut body = upstream.bytes_stream();
            let mut idle_since: Option<Instant> = None;
            let mut total: u64 = 0;

            while let Some(next) = body.next().await {
                let chunk = match next {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("relay: upstream read error for {} after {} bytes: {}", id, total, e);
                        break;
                    }
                };
                total += chunk.len() as u64;

                if pump.tx.receiver_count() == 0 {
                    if idle_since.get_or_insert_with(Instant::now).elapsed() >= IDLE_GRACE {
                        debug!("relay: no subscribers for {}, closing upstream", id);
                        break;
                    }
                    continue;
                }
                idle_since = None;
                let _ = pump.tx.send(chunk);
            }

            info!("relay: upstream for {} closed ({} bytes)", id, total);
            let mut map = streams.lock().await;
            if map.get(&id).is_some_and(|current| Arc::ptr_eq(current, &pump)) {
                map.remove(&id);
            }
        });

        Ok((shared, rx))
    }
}

fn forwarded(name: &str) -> bool {
    name.starts_with("icy-") || name == "content-type"
}

async fn stream_station(Path(id): Path<String>, State(state): State<RelayState>) -> Response {
    let (shared, rx) = match state.subscribe(&id).await {
        Ok(pair) => pair,
        Err(code) => {
            warn!("relay: cannot serve {}: {}", id, code);
            let mut resp = Response::new(Body::empty());
            *resp.status_mut() = code;
            return resp;
        }
    };

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(chunk) => return Some((Ok::<Bytes, std::io::Error>(chunk), rx)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("relay: subscriber lagged by {} chunks", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    let mut resp = Response::new(Body::from_stream(stream));
    for (name, value) in &shared.headers {
        if forwarded(name.as_str()) {
            if let Ok(hv) = axum::http::HeaderValue::from_bytes(value.as_bytes()) {
                resp.headers_mut().insert(name.clone(), hv);
            }
        }
    }
    resp
}

/// Running relay; cheap to clone.
#[derive(Clone, Debug)]
pub struct StreamProxy {
    addr: SocketAddr,
}

impl StreamProxy {
    /// Bind on an ephemeral localhost port and start serving.
    pub async fn start(
        state_manager: Arc<StateManager>,
        upstream_proxy: Option<&str>,
        account: Option<Account>,
    ) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("Icy-MetaData", HeaderValue::from_static("1"));
        let client = net::client_builder(upstream_proxy)?
            .redirect(reqwest::redirect::Policy::limited(10))
            .default_headers(headers)
            .build()?;

        let state = RelayState {
            state_manager,
            client,
            account,
            streams: Arc::new(Mutex::new(HashMap::new())),
        };
        let app = Router::new()
            .route("/stream/:id", get(stream_station))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        info!("Stream relay listening on http://{}", addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!("Stream relay error: {}", e);
            }
        });
        Ok(Self { addr })
    }

    pub fn url(&self, station_id: &str) -> String {
        format!("http://{}/stream/{}", self.addr, station_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap as AxumHeaders;
    use radiola_core::protocol::Station;
    use radiola_core::secrets::{SecretBackend, SecretError};

    struct FixedPassword;

    impl SecretBackend for FixedPassword {
        fn get(&self, _email: &str) -> Result<Option<String>, SecretError> {
            Ok(Some("hunter2".into()))
        }
        fn set(&self, _: &str, _: &str, _: &str) -> Result<(), SecretError> {
            Ok(())
        }
        fn delete(&self, _: &str) -> Result<(), SecretError> {
            Ok(())
        }
    }

    async fn upstream(headers: AxumHeaders) -> Response {
        let authorized = headers
            .get("authorization")
            .map(|v| v.to_str().unwrap_or_default().starts_with("Basic "))
            .unwrap_or(false);
        let icy = headers.get("icy-metadata").is_some();
        let mut resp = Response::new(Body::from(format!("audio auth={authorized} icy={icy}")));
        resp.headers_mut()
            .insert("icy-name", HeaderValue::from_static("Test FM"));
        resp.headers_mut()
            .insert("content-type", HeaderValue::from_static("audio/mpeg"));
        resp.headers_mut()
            .insert("x-private", HeaderValue::from_static("nope"));
        resp
    }

    async fn serve_upstream() -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/live", get(upstream));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn relay_for(station: Station) -> (tempfile::TempDir, StreamProxy) {
        let dir = tempfile::tempdir().unwrap();
        let mgr = Arc::new(StateManager::new(
            dir.path().join("state.json"),
            &dir.path().join("ratings.toml"),
            vec![station],
        ));
        let account = Account {
            email: "me@example.com".into(),
            secrets: SecretService::with_backend(Arc::new(FixedPassword)),
        };
        let proxy = StreamProxy::start(mgr, None, Some(account)).await.unwrap();
        (dir, proxy)
    }

    #[tokio::test]
    async fn relays_body_and_icy_headers() {
        let addr = serve_upstream().await;
        let station = Station::new("Test", format!("http://{addr}/live"));
        let id = station.id.clone();
        let (_dir, proxy) = relay_for(station).await;

        let resp = reqwest::get(proxy.url(&id)).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["icy-name"], "Test FM");
        assert!(resp.headers().get("x-private").is_none());
        assert_eq!(resp.text().await.unwrap(), "audio auth=false icy=true");
    }

    #[tokio::test]
    async fn adds_basic_auth_when_station_requires_it() {
        let addr = serve_upstream().await;
        let station = Station {
            requires_auth: true,
            ..Station::new("Members", format!("http://{addr}/live"))
        };
        let id = station.id.clone();
        let (_dir, proxy) = relay_for(station).await;

        let body = reqwest::get(proxy.url(&id)).await.unwrap().text().await.unwrap();
        assert_eq!(body, "audio auth=true icy=true");
    }

    #[tokio::test]
    async fn unknown_station_is_404() {
        let (_dir, proxy) = relay_for(Station::new("A", "http://127.0.0.1:9/a")).await;
        let resp = reqwest::get(proxy.url("missing")).await.unwrap();
        assert_eq!(resp.status(), 404);
    }
}
