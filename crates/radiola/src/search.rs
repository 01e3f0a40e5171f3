//! Station directory search against a radio-browser mirror.

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use radiola_core::net;
use radiola_core::protocol::Station;

const TIMEOUT: Duration = Duration::from_secs(20);
const MAX_GENRES: usize = 5;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("network error: {0}")]
    Net(String),
    #[error("search timed out")]
    Timeout,
    #[error("directory returned {status}: {message}")]
    Service { status: u16, message: String },
    #[error("invalid directory address: {0}")]
    BadBase(String),
    #[error(transparent)]
    Proxy(#[from] net::ProxyError),
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SearchError::Timeout
        } else if let Some(status) = e.status() {
            SearchError::Service {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unknown").to_string(),
            }
        } else {
            SearchError::Net(e.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchResult {
    Station(Station),
    Genre { name: String, station_count: u64 },
}

impl SearchResult {
    /// Bold part and the trailing qualifier of a result row.
    pub fn label_parts(&self) -> (&str, String) {
        match self {
            SearchResult::Station(station) => {
                let country = if station.country.is_empty() {
                    "unknown".to_string()
                } else {
                    station.country.clone()
                };
                (station.name.as_str(), format!("({})", country))
            }
            SearchResult::Genre { name, .. } => (name.as_str(), "(genre)".to_string()),
        }
    }

    pub fn markup(&self) -> String {
        let (name, qualifier) = self.label_parts();
        format!("**{}** {}", name, qualifier)
    }
}

#[derive(Debug, Deserialize)]
struct DirectoryStation {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    url_resolved: String,
    #[serde(default)]
    homepage: String,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    country: String,
}

impl DirectoryStation {
    fn into_station(self) -> Option<Station> {
        let name = self.name.trim().to_string();
        let url = if self.url_resolved.is_empty() {
            self.url
        } else {
            self.url_resolved
        };
        if name.is_empty() || url.is_empty() {
            return None;
        }
        Some(Station {
            description: self.homepage,
            tags: self
                .tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            country: self.country,
            use_quick_mix: true,
            ..Station::new(name, url)
        })
    }
}

#[derive(Debug, Deserialize)]
struct DirectoryTag {
    name: String,
    #[serde(default)]
    stationcount: u64,
}

#[derive(Clone)]
pub struct DirectoryClient {
    client: reqwest::Client,
    api_base: Url,
    limit: usize,
}

impl DirectoryClient {
    pub fn new(api_base: &str, limit: usize, proxy: Option<&str>) -> Result<Self, SearchError> {
        let api_base = Url::parse(api_base).map_err(|e| SearchError::BadBase(e.to_string()))?;
        if api_base.cannot_be_a_base() {
            return Err(SearchError::BadBase(api_base.to_string()));
        }
        Ok(Self {
            client: net::http_client(proxy, Some(TIMEOUT))?,
            api_base,
            limit,
        })
    }

    /// `segments` are appended to the base path, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, SearchError> {
        let url = self.endpoint(segments);
        debug!("directory request {}", url);
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                warn!("directory request failed: {}", e);
                SearchError::from(e)
            })?;
        Ok(response.json().await?)
    }

    async fn stations(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Vec<Station>, SearchError> {
        let found: Vec<DirectoryStation> = self.get(segments, query).await?;
        let mut seen = std::collections::HashSet::new();
        Ok(found
            .into_iter()
            .filter_map(DirectoryStation::into_station)
            .filter(|s| seen.insert(s.url.clone()))
            .collect())
    }

    /// Matching genres first, then stations whose name matches.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let limit = self.limit.to_string();
        let tags: Vec<DirectoryTag> = self
            .get(
                &["json", "tags", query],
                &[
                    ("order", "stationcount".to_string()),
                    ("reverse", "true".to_string()),
                    ("limit", MAX_GENRES.to_string()),
                ],
            )
            .await?;
        let stations = self
            .stations(
                &["json", "stations", "search"],
                &[
                    ("name", query.to_string()),
                    ("limit", limit),
                    ("hidebroken", "true".to_string()),
                    ("order", "votes".to_string()),
                    ("reverse", "true".to_string()),
                ],
            )
            .await?;

        let mut results: Vec<SearchResult> = tags
            .into_iter()
            .filter(|t| t.stationcount > 0)
            .map(|t| SearchResult::Genre {
                name: t.name,
                station_count: t.stationcount,
            })
            .collect();
        results.extend(stations.into_iter().map(SearchResult::Station));
        Ok(results)
    }

    /// Stations carrying exactly `tag`.
    pub async fn by_tag(&self, tag: &str) -> Result<Vec<SearchResult>, SearchError> {
        let stations = self
            .stations(
                &["json", "stations", "bytagexact", tag],
                &[
                    ("limit", self.limit.to_string()),
                    ("hidebroken", "true".to_string()),
                    ("order", "votes".to_string()),
                    ("reverse", "true".to_string()),
                ],
            )
            .await?;
        Ok(stations.into_iter().map(SearchResult::Station).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn tags(Path(filter): Path<String>) -> Json<Value> {
        assert_eq!(filter, "jazz");
        Json(json!([
            {"name": "jazz", "stationcount": 812},
            {"name": "jazz fusion", "stationcount": 0},
        ]))
    }

    async fn search(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
        assert_eq!(q.get("name").map(String::as_str), Some("jazz"));
        assert_eq!(q.get("limit").map(String::as_str), Some("10"));
        Json(json!([
            {"name": "Jazz Radio", "url": "http://a/stream", "url_resolved": "http://a/live.mp3",
             "tags": "jazz, smooth jazz,", "country": "France"},
            {"name": "Jazz Radio (mirror)", "url": "http://a/live.mp3", "country": "France"},
            {"name": "", "url": "http://nameless/"},
            {"name": "KJZZ", "url": "http://kjzz/"},
        ]))
    }

    async fn by_tag(Path(tag): Path<String>) -> Json<Value> {
        assert_eq!(tag, "drum and bass");
        Json(json!([{"name": "DnB FM", "url": "http://dnb/", "country": "UK"}]))
    }

    async fn serve() -> DirectoryClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/json/tags/:filter", get(tags))
            .route("/json/stations/search", get(search))
            .route("/json/stations/bytagexact/:tag", get(by_tag));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        DirectoryClient::new(&format!("http://{addr}/"), 10, None).unwrap()
    }

    #[test]
    fn markup_names_the_kind_of_result() {
        let station = Station {
            country: "Germany".into(),
            ..Station::new("Radio Eins", "http://eins/")
        };
        assert_eq!(SearchResult::Station(station).markup(), "**Radio Eins** (Germany)");
        let genre = SearchResult::Genre {
            name: "ambient".into(),
            station_count: 3,
        };
        assert_eq!(genre.markup(), "**ambient** (genre)");
        assert_eq!(
            SearchResult::Station(Station::new("X", "http://x/")).markup(),
            "**X** (unknown)"
        );
    }

    #[test]
    fn endpoint_segments_are_escaped() {
        let client = DirectoryClient::new("https://de1.api.radio-browser.info/", 10, None).unwrap();
        assert_eq!(
            client.endpoint(&["json", "stations", "bytagexact", "r&b/soul"]).as_str(),
            "https://de1.api.radio-browser.info/json/stations/bytagexact/r&b%2Fsoul"
        );
        assert_eq!(
            client.endpoint(&["json", "tags", "drum and bass"]).path(),
            "/json/tags/drum%20and%20bass"
        );
    }

    #[test]
    fn rejects_a_base_that_is_not_a_url() {
        assert!(matches!(
            DirectoryClient::new("radio-browser", 10, None),
            Err(SearchError::BadBase(_))
        ));
    }

    #[tokio::test]
    async fn genres_come_before_stations() {
        let client = serve().await;
        let results = client.search(" jazz ").await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0],
            SearchResult::Genre {
                name: "jazz".into(),
                station_count: 812
            }
        );
        match &results[1] {
            SearchResult::Station(s) => {
                assert_eq!(s.url, "http://a/live.mp3");
                assert_eq!(s.tags, vec!["jazz".to_string(), "smooth jazz".to_string()]);
                assert!(s.use_quick_mix);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(&results[2], SearchResult::Station(s) if s.name == "KJZZ"));
    }

    #[tokio::test]
    async fn tag_search_lists_stations() {
        let client = serve().await;
        let results = client.by_tag("drum and bass").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].markup(), "**DnB FM** (UK)");
    }

    #[tokio::test]
    async fn empty_query_skips_the_network() {
        let client = DirectoryClient::new("http://127.0.0.1:9", 10, None).unwrap();
        assert!(client.search("   ").await.unwrap().is_empty());
        assert!(matches!(client.search("x").await, Err(SearchError::Net(_))));
    }
}
