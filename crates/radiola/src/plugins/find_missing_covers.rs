//! Fill in missing cover art from Last.fm.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use radiola_core::net;
use radiola_core::platform;
use radiola_core::protocol::Song;
use radiola_core::settings::SettingsHandle;

use crate::plugin::{Plugin, PluginContext, PluginError};
use crate::window::{Window, WindowEvent};

const LASTFM_ROOT: &str = "http://ws.audioscrobbler.com/2.0/";
const LASTFM_KEY: &str = "997f635176130d5d6fe3a7387de601a8";
const TIMEOUT: Duration = Duration::from_secs(30);
const BRACKETS: [char; 3] = ['(', '[', '{'];
/// Dashed forms come first so " - LP" is not cut down to a trailing " -".
const SUFFIXES_TO_STRIP: [&str; 12] = [
    " - EP", " EP", " - ep", " ep", " - Ep", " Ep", " - LP", " LP", " - lp", " lp", " - Lp", " Lp",
];

/// Error codes from the Last.fm JSON API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastfmErrorCode {
    InvalidService = 2,
    InvalidMethod = 3,
    AuthFailed = 4,
    InvalidFormat = 5,
    InvalidParams = 6,
    InvalidResource = 7,
    OperationFailed = 8,
    InvalidSessionKey = 9,
    InvalidApiKey = 10,
    ServiceOffline = 11,
    InvalidMethodSignature = 13,
    TemporaryError = 16,
    SuspendedApiKey = 26,
    RateLimitExceeded = 29,
}

impl LastfmErrorCode {
    pub fn from_code(code: i64) -> Option<Self> {
        use LastfmErrorCode::*;
        Some(match code {
            2 => InvalidService,
            3 => InvalidMethod,
            4 => AuthFailed,
            5 => InvalidFormat,
            6 => InvalidParams,
            7 => InvalidResource,
            8 => OperationFailed,
            9 => InvalidSessionKey,
            10 => InvalidApiKey,
            11 => ServiceOffline,
            13 => InvalidMethodSignature,
            16 => TemporaryError,
            26 => SuspendedApiKey,
            29 => RateLimitExceeded,
            _ => return None,
        })
    }
}

#[derive(Debug, Error)]
pub enum LastfmError {
    #[error("Network error: {0}")]
    Net(String),
    #[error("Network error: Timeout")]
    Timeout,
}

impl From<reqwest::Error> for LastfmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LastfmError::Timeout
        } else if e.is_status() {
            LastfmError::Net(format!("HTTP error: {e}"))
        } else {
            LastfmError::Net(e.to_string())
        }
    }
}

/// Trim an artist or album name to what Last.fm can match.
pub fn clean_text(text: &str, album: bool) -> String {
    let mut text = text.to_string();
    for bracket in BRACKETS {
        if let Some(pos) = text.find(bracket) {
            text = text[..pos].trim().to_string();
        }
    }
    if album {
        for suffix in SUFFIXES_TO_STRIP {
            if let Some(stripped) = text.strip_suffix(suffix) {
                text = stripped.trim().to_string();
            }
        }
    }
    text
}

/// Largest usable image: sizes run small, medium, large, extralarge, mega,
/// then an unnamed one; the first two are too small to use.
pub fn pick_image(images: &[Value]) -> Option<String> {
    let mut preferred: Vec<&Value> = images.iter().skip(2).rev().collect();
    if !preferred.is_empty() {
        let unnamed = preferred.remove(0);
        preferred.push(unnamed);
    }
    preferred
        .into_iter()
        .filter_map(|image| image.get("#text").and_then(Value::as_str))
        .find(|url| !url.is_empty())
        .map(str::to_string)
}

/// Image URL from an `album.getinfo`/`artist.getinfo` response.
fn image_from_response(response: &Value, key: &str) -> Option<String> {
    if let Some(images) = response
        .get(key)
        .and_then(|v| v.get("image"))
        .and_then(Value::as_array)
    {
        if let Some(url) = pick_image(images) {
            return Some(url);
        }
    }
    if let Some(code) = response.get("error").and_then(Value::as_i64) {
        let message = response
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("No Message");
        match LastfmErrorCode::from_code(code) {
            Some(code) => debug!("{:?}: {}", code, message),
            None => debug!("Last.fm error {}: {}", code, message),
        }
    }
    None
}

#[derive(Clone)]
pub struct LastfmClient {
    client: reqwest::Client,
    root: String,
}

impl LastfmClient {
    pub fn new(proxy: Option<&str>) -> Result<Self, net::ProxyError> {
        Ok(Self {
            client: net::http_client(proxy, Some(TIMEOUT))?,
            root: LASTFM_ROOT.to_string(),
        })
    }

    #[cfg(test)]
    fn with_root(root: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            root,
        }
    }

    async fn call(&self, params: &[(&str, &str)], key: &str) -> Result<Option<String>, LastfmError> {
        let mut query = vec![("api_key", LASTFM_KEY), ("format", "json")];
        query.extend_from_slice(params);
        let response = self
            .client
            .get(&self.root)
            .query(&query)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                error!("Last.fm request failed: {}", e);
                LastfmError::from(e)
            })?;
        let body: Value = response.json().await?;
        Ok(image_from_response(&body, key))
    }

    /// Album art first, then a picture of the artist.
    pub async fn find_art(&self, song: &Song) -> Result<Option<String>, LastfmError> {
        let artist = clean_text(&song.artist, false);
        if artist.is_empty() {
            return Ok(None);
        }
        if !song.album.is_empty() {
            let album = clean_text(&song.album, true);
            let params = [("method", "album.getinfo"), ("artist", artist.as_str()), ("album", album.as_str())];
            if let Some(url) = self.call(&params, "album").await? {
                info!("got album image from Last.fm for {}", song.index);
                return Ok(Some(url));
            }
        }
        let params = [("method", "artist.getinfo"), ("artist", artist.as_str())];
        if let Some(url) = self.call(&params, "artist").await? {
            info!("got artist image from Last.fm for {}", song.index);
            return Ok(Some(url));
        }
        Ok(None)
    }

    /// Download `url` into `dir`; returns the file path.
    pub async fn download(&self, url: &str, dir: &Path, song: &Song) -> Result<PathBuf, LastfmError> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)?
            .bytes()
            .await?;
        let ext = url
            .rsplit('.')
            .next()
            .filter(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png" | "gif"))
            .unwrap_or("jpg");
        let path = dir.join(format!("{}.{}", song.track_token, ext));
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| LastfmError::Net(e.to_string()))?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| LastfmError::Net(e.to_string()))?;
        Ok(path)
    }
}

pub struct FindMissingCovers {
    window: Window,
    proxy: Option<String>,
    client: Option<LastfmClient>,
    task: Option<JoinHandle<()>>,
}

impl FindMissingCovers {
    pub fn create(ctx: &PluginContext) -> Box<dyn Plugin> {
        Box::new(Self {
            window: ctx.window.clone(),
            proxy: ctx.api_proxy.clone(),
            client: None,
            task: None,
        })
    }
}

async fn fetch_cover(client: LastfmClient, window: Window, song: Song) {
    let url = match client.find_art(&song).await {
        Ok(Some(url)) => url,
        Ok(None) => {
            info!(
                "No match for {} by {} for {} found with Last.fm.",
                song.title, song.artist, song.index
            );
            return;
        }
        Err(e) => {
            warn!("Last.fm lookup failed: {}", e);
            return;
        }
    };
    match client.download(&url, &platform::covers_dir(), &song).await {
        Ok(path) => {
            window
                .set_song_art(song.index, &format!("file://{}", path.display()))
                .await
        }
        Err(e) => warn!("Failed to download cover {}: {}", url, e),
    }
}

#[async_trait]
impl Plugin for FindMissingCovers {
    fn name(&self) -> &'static str {
        "find_missing_covers"
    }

    fn description(&self) -> &'static str {
        "Find missing covers with Last.fm"
    }

    async fn prepare(&mut self, _settings: &SettingsHandle) -> Result<(), PluginError> {
        let client = LastfmClient::new(self.proxy.as_deref())
            .map_err(|e| PluginError::Unavailable(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn enable(&mut self, _settings: &SettingsHandle) -> anyhow::Result<()> {
        let Some(client) = self.client.clone() else {
            return Ok(());
        };
        let mut events = self.window.subscribe();
        let window = self.window.clone();
        self.task = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(WindowEvent::NoArtUrl(song)) => {
                        tokio::spawn(fetch_cover(client.clone(), window.clone(), song));
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    fn images(urls: [&str; 6]) -> Vec<Value> {
        let sizes = ["small", "medium", "large", "extralarge", "mega", ""];
        sizes
            .iter()
            .zip(urls)
            .map(|(size, url)| json!({"#text": url, "size": size}))
            .collect()
    }

    #[test]
    fn cleans_brackets_and_record_suffixes() {
        assert_eq!(clean_text("Massive Attack (Remastered)", false), "Massive Attack");
        assert_eq!(clean_text("Mezzanine [Deluxe] {2019}", true), "Mezzanine");
        assert_eq!(clean_text("Windowlicker EP", true), "Windowlicker");
        assert_eq!(clean_text("Selected Works - LP", true), "Selected Works");
        assert_eq!(clean_text("Peel Session - ep", true), "Peel Session");
        assert_eq!(clean_text("Drukqs Lp", true), "Drukqs");
        assert_eq!(clean_text("Windowlicker EP", false), "Windowlicker EP");
    }

    #[test]
    fn prefers_mega_then_down_then_unnamed() {
        let all = images(["s", "m", "l", "xl", "mega", "plain"]);
        assert_eq!(pick_image(&all).as_deref(), Some("mega"));

        let no_mega = images(["s", "m", "l", "xl", "", "plain"]);
        assert_eq!(pick_image(&no_mega).as_deref(), Some("xl"));

        let only_unnamed = images(["s", "m", "", "", "", "plain"]);
        assert_eq!(pick_image(&only_unnamed).as_deref(), Some("plain"));

        let only_small = images(["s", "m", "", "", "", ""]);
        assert_eq!(pick_image(&only_small), None);
        assert_eq!(pick_image(&[]), None);
    }

    #[test]
    fn error_codes_map_to_enum() {
        assert_eq!(LastfmErrorCode::from_code(6), Some(LastfmErrorCode::InvalidParams));
        assert_eq!(LastfmErrorCode::from_code(29), Some(LastfmErrorCode::RateLimitExceeded));
        assert_eq!(LastfmErrorCode::from_code(1), None);
        let body = json!({"error": 6, "message": "Album not found"});
        assert_eq!(image_from_response(&body, "album"), None);
    }

    async fn fake_lastfm(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
        assert_eq!(q.get("api_key").map(String::as_str), Some(LASTFM_KEY));
        match q.get("method").map(String::as_str) {
            Some("album.getinfo") => Json(json!({"error": 6, "message": "Album not found"})),
            Some("artist.getinfo") => {
                assert_eq!(q.get("artist").map(String::as_str), Some("Boards of Canada"));
                Json(json!({"artist": {"image": images(["s", "m", "l", "xl", "", ""])}}))
            }
            _ => Json(json!({"error": 3})),
        }
    }

    #[tokio::test]
    async fn falls_back_to_artist_image() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/2.0/", get(fake_lastfm)))
                .await
                .unwrap();
        });

        let client = LastfmClient::with_root(format!("http://{addr}/2.0/"));
        let song = Song {
            artist: "Boards of Canada (live)".into(),
            album: "Geogaddi".into(),
            ..Default::default()
        };
        assert_eq!(client.find_art(&song).await.unwrap().as_deref(), Some("xl"));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_net_error() {
        let client = LastfmClient::with_root("http://127.0.0.1:9/2.0/".into());
        let song = Song {
            artist: "Air".into(),
            ..Default::default()
        };
        assert!(matches!(client.find_art(&song).await, Err(LastfmError::Net(_))));
    }
}
