//! Optional feature modules and their enable/disable lifecycle.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};

use radiola_core::settings::{SettingsHandle, SettingsStore};

use crate::logging::JournalControl;
use crate::plugins;
use crate::window::Window;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PluginError {
    /// The platform service the plugin needs is missing.
    #[error("{0}")]
    Unavailable(String),
    #[error("Could not find plugin")]
    NotFound,
}

/// Value written by a preferences dialog.
#[derive(Debug, Clone, PartialEq)]
pub enum PrefValue {
    Bool(bool),
    Choice(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrefKind {
    Toggle(bool),
    Choice {
        /// `(value, label)` pairs.
        options: Vec<(String, String)>,
        selected: String,
        /// Value that needs a yes/no confirmation before it is applied.
        confirm: Option<(String, String)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrefItem {
    pub key: String,
    pub label: String,
    pub kind: PrefKind,
}

impl PrefItem {
    pub fn toggle(key: &str, label: &str, value: bool) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            kind: PrefKind::Toggle(value),
        }
    }
}

#[async_trait]
pub trait Plugin: Send {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn default_enabled(&self) -> bool {
        false
    }

    /// Runs once, before the first enable.
    async fn prepare(&mut self, _settings: &SettingsHandle) -> Result<(), PluginError> {
        Ok(())
    }

    async fn enable(&mut self, settings: &SettingsHandle) -> anyhow::Result<()>;

    async fn disable(&mut self) -> anyhow::Result<()>;

    fn preferences(&self, _settings: &SettingsHandle) -> Option<Vec<PrefItem>> {
        None
    }

    fn set_preference(
        &mut self,
        _settings: &SettingsHandle,
        _key: &str,
        _value: PrefValue,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn reset_preferences(&mut self, settings: &SettingsHandle) -> anyhow::Result<()> {
        settings.reset_data()
    }
}

/// Everything a plugin may hold on to.
#[derive(Clone)]
pub struct PluginContext {
    pub window: Window,
    pub journal: JournalControl,
    /// Proxy for third-party web services.
    pub api_proxy: Option<String>,
}

pub type PluginFactory = fn(&PluginContext) -> Box<dyn Plugin>;

/// A loaded (or failed) plugin plus its lifecycle flags.
pub struct PluginEntry {
    name: String,
    description: String,
    plugin: Option<Box<dyn Plugin>>,
    settings: SettingsHandle,
    prepared: bool,
    error: Option<PluginError>,
    enabled: bool,
}

impl PluginEntry {
    pub fn new(plugin: Box<dyn Plugin>, settings: SettingsHandle) -> Self {
        Self {
            name: plugin.name().to_string(),
            description: plugin.description().to_string(),
            plugin: Some(plugin),
            settings,
            prepared: false,
            error: None,
            enabled: false,
        }
    }

    /// Placeholder for a configured name that has no implementation.
    pub fn failed(name: &str, settings: SettingsHandle, err: PluginError) -> Self {
        error!("Error loading plugin {}: {}", name, err);
        Self {
            name: name.to_string(),
            description: String::new(),
            plugin: None,
            settings,
            prepared: true,
            error: Some(err),
            enabled: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn error(&self) -> Option<&PluginError> {
        self.error.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    pub async fn enable(&mut self) {
        let Some(plugin) = self.plugin.as_mut() else {
            return;
        };
        if !self.prepared {
            self.error = plugin.prepare(&self.settings).await.err();
            self.prepared = true;
            if let Some(e) = &self.error {
                warn!("Plugin {} unavailable: {}", self.name, e);
            }
        }
        if self.error.is_some() || self.enabled {
            return;
        }
        info!("Enabling module {}", self.name);
        if let Err(e) = plugin.enable(&self.settings).await {
            warn!("Plugin {} failed to enable: {:#}", self.name, e);
        }
        self.enabled = true;
    }

    pub async fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        info!("Disabling module {}", self.name);
        if let Some(plugin) = self.plugin.as_mut() {
            if let Err(e) = plugin.disable().await {
                warn!("Plugin {} failed to disable: {:#}", self.name, e);
            }
        }
        self.enabled = false;
    }

    /// Only prepared, working plugins offer preferences.
    pub fn preferences(&self) -> Option<Vec<PrefItem>> {
        if !self.prepared || self.error.is_some() {
            return None;
        }
        self.plugin.as_ref()?.preferences(&self.settings)
    }

    pub fn set_preference(&mut self, key: &str, value: PrefValue) -> anyhow::Result<()> {
        match self.plugin.as_mut() {
            Some(plugin) => plugin.set_preference(&self.settings, key, value),
            None => Ok(()),
        }
    }

    pub fn reset_preferences(&mut self) -> anyhow::Result<()> {
        match self.plugin.as_mut() {
            Some(plugin) => plugin.reset_preferences(&self.settings),
            None => Ok(()),
        }
    }
}

pub struct PluginManager {
    ctx: PluginContext,
    store: SettingsStore,
    registry: Vec<(&'static str, PluginFactory)>,
    plugins: BTreeMap<String, PluginEntry>,
}

impl PluginManager {
    pub fn new(ctx: PluginContext, store: SettingsStore) -> Self {
        Self::with_registry(ctx, store, plugins::builtin())
    }

    pub fn with_registry(
        ctx: PluginContext,
        store: SettingsStore,
        registry: Vec<(&'static str, PluginFactory)>,
    ) -> Self {
        Self {
            ctx,
            store,
            registry,
            plugins: BTreeMap::new(),
        }
    }

    /// Instantiate every known plugin and apply its stored enabled flag.
    /// Already loaded plugins are reused.
    pub async fn load_plugins(&mut self) {
        let mut names: Vec<String> = self.registry.iter().map(|(n, _)| n.to_string()).collect();
        for name in self.store.plugin_names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }

        for name in names {
            if !self.plugins.contains_key(&name) {
                let entry = self.instantiate(&name);
                self.plugins.insert(name.clone(), entry);
            }
            if let Some(entry) = self.plugins.get_mut(&name) {
                if entry.settings.enabled() {
                    entry.enable().await;
                } else {
                    entry.disable().await;
                }
            }
        }
    }

    fn instantiate(&self, name: &str) -> PluginEntry {
        match self.registry.iter().find(|(n, _)| *n == name) {
            Some((_, factory)) => {
                let plugin = factory(&self.ctx);
                let settings = self.store.plugin(name, plugin.default_enabled());
                PluginEntry::new(plugin, settings)
            }
            None => PluginEntry::failed(name, self.store.plugin(name, false), PluginError::NotFound),
        }
    }

    /// Flip, persist and apply the enabled flag.
    pub async fn toggle(&mut self, name: &str) -> anyhow::Result<bool> {
        let Some(entry) = self.plugins.get_mut(name) else {
            anyhow::bail!("no plugin named {}", name);
        };
        let enabled = !entry.settings.enabled();
        entry.settings.set_enabled(enabled)?;
        if enabled {
            entry.enable().await;
        } else {
            entry.disable().await;
        }
        Ok(entry.is_enabled())
    }

    pub fn get(&self, name: &str) -> Option<&PluginEntry> {
        self.plugins.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PluginEntry> {
        self.plugins.get_mut(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = &PluginEntry> {
        self.plugins.values()
    }

    /// Disable everything; used on quit.
    pub async fn shutdown(&mut self) {
        for entry in self.plugins.values_mut() {
            entry.disable().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::tests::harness;
    use radiola_core::config::Config;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counting {
        fail: bool,
        prepares: Arc<AtomicUsize>,
        enables: Arc<AtomicUsize>,
        disables: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Plugin for Counting {
        fn name(&self) -> &'static str {
            if self.fail {
                "broken"
            } else {
                "counting"
            }
        }
        fn description(&self) -> &'static str {
            "counts calls"
        }
        async fn prepare(&mut self, _settings: &SettingsHandle) -> Result<(), PluginError> {
            self.prepares.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PluginError::Unavailable("service not found".into()))
            } else {
                Ok(())
            }
        }
        async fn enable(&mut self, _settings: &SettingsHandle) -> anyhow::Result<()> {
            self.enables.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn disable(&mut self) -> anyhow::Result<()> {
            self.disables.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn preferences(&self, _settings: &SettingsHandle) -> Option<Vec<PrefItem>> {
            Some(vec![PrefItem::toggle("flag", "Flag", true)])
        }
    }

    fn store() -> (tempfile::TempDir, SettingsStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        (dir, SettingsStore::new(Config::default(), path))
    }

    #[tokio::test]
    async fn enable_prepares_once_and_is_idempotent() {
        let (_dir, store) = store();
        let plugin = Counting::default();
        let enables = plugin.enables.clone();
        let disables = plugin.disables.clone();
        let prepares = plugin.prepares.clone();
        let mut entry = PluginEntry::new(Box::new(plugin), store.plugin("counting", false));

        assert!(entry.preferences().is_none());
        entry.enable().await;
        entry.enable().await;
        assert!(entry.is_enabled());
        assert_eq!(enables.load(Ordering::SeqCst), 1);

        entry.disable().await;
        entry.disable().await;
        assert!(!entry.is_enabled());
        assert_eq!(disables.load(Ordering::SeqCst), 1);

        entry.enable().await;
        assert_eq!(enables.load(Ordering::SeqCst), 2);
        assert_eq!(prepares.load(Ordering::SeqCst), 1);
        assert!(entry.preferences().is_some());
    }

    #[tokio::test]
    async fn failed_prepare_blocks_enable() {
        let (_dir, store) = store();
        let plugin = Counting {
            fail: true,
            ..Default::default()
        };
        let enables = plugin.enables.clone();
        let prepares = plugin.prepares.clone();
        let mut entry = PluginEntry::new(Box::new(plugin), store.plugin("broken", true));

        entry.enable().await;
        entry.enable().await;
        assert!(!entry.is_enabled());
        assert_eq!(enables.load(Ordering::SeqCst), 0);
        assert_eq!(prepares.load(Ordering::SeqCst), 1);
        assert_eq!(
            entry.error(),
            Some(&PluginError::Unavailable("service not found".into()))
        );
        assert!(entry.preferences().is_none());
    }

    fn counting(_ctx: &PluginContext) -> Box<dyn Plugin> {
        Box::new(Counting::default())
    }

    #[tokio::test]
    async fn load_plugins_marks_unknown_names_and_toggles() {
        let h = harness();
        let (_dir, store) = store();
        store.plugin("ghost", false).set_enabled(true).unwrap();
        let ctx = PluginContext {
            window: h.window.clone(),
            journal: JournalControl::detached(false),
            api_proxy: None,
        };
        let mut manager = PluginManager::with_registry(ctx, store.clone(), vec![("counting", counting as PluginFactory)]);

        manager.load_plugins().await;
        assert_eq!(manager.get("ghost").unwrap().error(), Some(&PluginError::NotFound));
        assert!(!manager.get("counting").unwrap().is_enabled());

        assert!(manager.toggle("counting").await.unwrap());
        assert!(store.plugin("counting", false).enabled());

        // second load reuses the instance and keeps it enabled
        manager.load_plugins().await;
        assert!(manager.get("counting").unwrap().is_enabled());
        assert_eq!(manager.entries().count(), 2);

        assert!(!manager.toggle("counting").await.unwrap());
        assert!(manager.toggle("nope").await.is_err());
    }
}
