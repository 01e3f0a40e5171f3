use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub stations: StationsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    /// Keyed by plugin name.
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_volume")]
    pub default_volume: f64,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_ratings_file")]
    pub ratings_file: PathBuf,
}

/// Upstream proxies.  `proxy` applies to everything, `control_proxy` to
/// API requests only (directory search, Last.fm) and wins over `proxy`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NetworkConfig {
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub control_proxy: Option<String>,
}

impl NetworkConfig {
    pub fn api_proxy(&self) -> Option<&str> {
        self.control_proxy
            .as_deref()
            .or(self.proxy.as_deref())
            .filter(|p| !p.is_empty())
    }

    pub fn stream_proxy(&self) -> Option<&str> {
        self.proxy.as_deref().filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AccountConfig {
    /// Account email; the password lives in the platform secret store.
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationsConfig {
    /// Local TOML station file, also where stations added from search land.
    #[serde(default = "default_stations_toml")]
    pub stations_toml: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    /// Base URL of a radio-browser mirror.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

/// Per-plugin persisted settings: the enabled flag plus a JSON blob the
/// plugin owns.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PluginSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            state_file: default_state_file(),
            ratings_file: default_ratings_file(),
        }
    }
}

impl Default for StationsConfig {
    fn default() -> Self {
        Self {
            stations_toml: default_stations_toml(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            limit: default_search_limit(),
        }
    }
}

fn default_volume() -> f64 {
    0.5
}

fn default_state_file() -> PathBuf {
    platform::data_dir().join("state.json")
}

fn default_ratings_file() -> PathBuf {
    platform::data_dir().join("ratings.toml")
}

fn default_stations_toml() -> PathBuf {
    platform::config_dir().join("stations.toml")
}

fn default_api_base() -> String {
    "https://de1.api.radio-browser.info".to_string()
}

fn default_search_limit() -> usize {
    40
}

/// Plugin renamed since older releases: old name, new name.
const LEGACY_PLUGINS: &[(&str, &str)] = &[("notification_icon", "notify")];

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        if config.migrate_legacy() {
            config.save_to(path)?;
        }
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// Moves settings of renamed plugins to their new name.  Returns true
    /// when anything changed.
    fn migrate_legacy(&mut self) -> bool {
        let mut changed = false;
        for (old, new) in LEGACY_PLUGINS {
            if let Some(legacy) = self.plugins.remove(*old) {
                changed = true;
                if legacy.enabled {
                    self.plugins.entry(new.to_string()).or_default().enabled = true;
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.player.default_volume, 0.5);
        assert!(config.plugins.is_empty());
        assert!(config.network.api_proxy().is_none());
        assert!(config.search.api_base.starts_with("https://"));
        assert!(config
            .stations
            .stations_toml
            .ends_with("radiola/stations.toml"));
    }

    #[test]
    fn control_proxy_wins_for_api_requests() {
        let network = NetworkConfig {
            proxy: Some("http://proxy:3128".into()),
            control_proxy: Some("http://control:8080".into()),
        };
        assert_eq!(network.api_proxy(), Some("http://control:8080"));
        assert_eq!(network.stream_proxy(), Some("http://proxy:3128"));

        let network = NetworkConfig {
            proxy: Some(String::new()),
            control_proxy: None,
        };
        assert_eq!(network.api_proxy(), None);
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn plugin_settings_round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.plugins.insert(
            "notify".into(),
            PluginSettings {
                enabled: true,
                data: r#"{"actions":false}"#.into(),
            },
        );
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        let notify = &loaded.plugins["notify"];
        assert!(notify.enabled);
        assert_eq!(notify.data, r#"{"actions":false}"#);
    }

    #[test]
    fn legacy_notification_icon_moves_to_notify() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[plugins.notification_icon]\nenabled = true\n\n[plugins.mpris]\nenabled = false\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(!config.plugins.contains_key("notification_icon"));
        assert!(config.plugins["notify"].enabled);
        assert!(!config.plugins["mpris"].enabled);

        let rewritten = std::fs::read_to_string(&path).unwrap();
        assert!(!rewritten.contains("notification_icon"));
    }
}
