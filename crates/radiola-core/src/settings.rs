//! Shared, persisted view of [`Config`].
//!
//! Plugins get a [`SettingsHandle`] scoped to their own `[plugins.<name>]`
//! table.  Every mutation rewrites the config file.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

use crate::config::{Config, PluginSettings};

#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<Mutex<Config>>,
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            inner: Arc::new(Mutex::new(config)),
            path,
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config = Config::load_from(path)?;
        Ok(Self::new(config, path.to_path_buf()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the whole configuration.
    pub fn config(&self) -> Config {
        self.lock().clone()
    }

    /// Mutates the configuration and persists it.
    pub fn update<R>(&self, f: impl FnOnce(&mut Config) -> R) -> anyhow::Result<R> {
        let mut config = self.lock();
        let result = f(&mut config);
        config.save_to(&self.path)?;
        Ok(result)
    }

    /// Plugin names that have a stored entry.
    pub fn plugin_names(&self) -> Vec<String> {
        self.lock().plugins.keys().cloned().collect()
    }

    pub fn plugin(&self, name: &str, default_enabled: bool) -> SettingsHandle {
        SettingsHandle {
            store: self.clone(),
            name: name.to_string(),
            default_enabled,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Config> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Settings of one plugin.
#[derive(Clone)]
pub struct SettingsHandle {
    store: SettingsStore,
    name: String,
    default_enabled: bool,
}

impl SettingsHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self) -> bool {
        self.store
            .lock()
            .plugins
            .get(&self.name)
            .map(|p| p.enabled)
            .unwrap_or(self.default_enabled)
    }

    pub fn set_enabled(&self, enabled: bool) -> anyhow::Result<()> {
        let default_enabled = self.default_enabled;
        self.store.update(|config| {
            config
                .plugins
                .entry(self.name.clone())
                .or_insert_with(|| PluginSettings {
                    enabled: default_enabled,
                    data: String::new(),
                })
                .enabled = enabled;
        })
    }

    /// Raw JSON blob, empty when never written.
    pub fn data(&self) -> String {
        self.store
            .lock()
            .plugins
            .get(&self.name)
            .map(|p| p.data.clone())
            .unwrap_or_default()
    }

    pub fn set_data(&self, data: &str) -> anyhow::Result<()> {
        let default_enabled = self.default_enabled;
        self.store.update(|config| {
            config
                .plugins
                .entry(self.name.clone())
                .or_insert_with(|| PluginSettings {
                    enabled: default_enabled,
                    data: String::new(),
                })
                .data = data.to_string();
        })
    }

    pub fn reset_data(&self) -> anyhow::Result<()> {
        self.store.update(|config| {
            if let Some(p) = config.plugins.get_mut(&self.name) {
                p.data.clear();
            }
        })
    }

    /// Decodes the blob, falling back to `T::default()` when it is empty or
    /// unreadable.
    pub fn load_data<T: DeserializeOwned + Default>(&self) -> T {
        let raw = self.data();
        if raw.is_empty() {
            return T::default();
        }
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Ignoring unreadable settings for plugin {}: {}", self.name, e);
                T::default()
            }
        }
    }

    pub fn store_data<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set_data(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Prefs {
        #[serde(default)]
        level: String,
    }

    fn store() -> (tempfile::TempDir, SettingsStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let store = SettingsStore::load(&path).unwrap();
        (dir, store)
    }

    #[test]
    fn unknown_plugin_uses_default_enabled() {
        let (_dir, store) = store();
        assert!(store.plugin("journald_logging", true).enabled());
        assert!(!store.plugin("mpris", false).enabled());
        assert!(store.plugin_names().is_empty());
    }

    #[test]
    fn enabled_flag_persists_across_reload() {
        let (dir, store) = store();
        store.plugin("mpris", false).set_enabled(true).unwrap();

        let reloaded = SettingsStore::load(&dir.path().join("config.toml")).unwrap();
        assert!(reloaded.plugin("mpris", false).enabled());
        assert_eq!(reloaded.plugin_names(), vec!["mpris".to_string()]);
    }

    #[test]
    fn data_blob_round_trip_and_reset() {
        let (_dir, store) = store();
        let handle = store.plugin("journald_logging", true);
        assert_eq!(handle.load_data::<Prefs>(), Prefs::default());

        handle
            .store_data(&Prefs {
                level: "debug".into(),
            })
            .unwrap();
        assert_eq!(handle.load_data::<Prefs>().level, "debug");
        // writing data must not flip the default enabled flag
        assert!(handle.enabled());

        handle.reset_data().unwrap();
        assert_eq!(handle.data(), "");
    }

    #[test]
    fn garbage_blob_falls_back_to_default() {
        let (_dir, store) = store();
        let handle = store.plugin("notify", false);
        handle.set_data("{not json").unwrap();
        assert_eq!(handle.load_data::<Prefs>(), Prefs::default());
    }
}
