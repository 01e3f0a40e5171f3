//! Send logs to the systemd journal.

use async_trait::async_trait;
use tracing::{info, Level};

use radiola_core::settings::SettingsHandle;

use crate::logging::JournalControl;
use crate::plugin::{Plugin, PluginContext, PluginError, PrefItem, PrefKind, PrefValue};

const DEFAULT_LEVEL: &str = "verbose";
const LEVELS: [(&str, &str); 3] = [
    ("debug", "High - debug"),
    ("verbose", "Default - verbose"),
    ("warning", "Low - warning"),
];
const DEBUG_WARNING: &str = "The debug logging level is not recommended unless you are \
    actually debugging an issue, as it generates very large logs.\n\n\
    Are you sure you want to set logging to debug?";

pub fn level_for(name: &str) -> Option<Level> {
    match name {
        "debug" => Some(Level::DEBUG),
        "verbose" => Some(Level::INFO),
        "warning" => Some(Level::WARN),
        _ => None,
    }
}

/// Stored level name, falling back to the default for empty or unknown data.
fn stored_level(settings: &SettingsHandle) -> String {
    let data = settings.data();
    if level_for(&data).is_some() {
        data
    } else {
        DEFAULT_LEVEL.to_string()
    }
}

pub struct JournaldLogging {
    journal: JournalControl,
}

impl JournaldLogging {
    pub fn create(ctx: &PluginContext) -> Box<dyn Plugin> {
        Box::new(Self {
            journal: ctx.journal.clone(),
        })
    }

    fn apply(&self, settings: &SettingsHandle, name: &str) -> anyhow::Result<()> {
        settings.set_data(name)?;
        self.journal.set_level(level_for(name));
        info!("setting journald logging level to: {}", name);
        Ok(())
    }
}

#[async_trait]
impl Plugin for JournaldLogging {
    fn name(&self) -> &'static str {
        "journald_logging"
    }

    fn description(&self) -> &'static str {
        "Store logs with the journald service"
    }

    fn default_enabled(&self) -> bool {
        true
    }

    async fn prepare(&mut self, _settings: &SettingsHandle) -> Result<(), PluginError> {
        if self.journal.is_available() {
            Ok(())
        } else {
            Err(PluginError::Unavailable("journald is not available".into()))
        }
    }

    async fn enable(&mut self, settings: &SettingsHandle) -> anyhow::Result<()> {
        let level = stored_level(settings);
        self.apply(settings, &level)
    }

    async fn disable(&mut self) -> anyhow::Result<()> {
        self.journal.set_level(None);
        Ok(())
    }

    fn preferences(&self, settings: &SettingsHandle) -> Option<Vec<PrefItem>> {
        Some(vec![PrefItem {
            key: "level".into(),
            label: "Set the journald logging level for Radiola".into(),
            kind: PrefKind::Choice {
                options: LEVELS
                    .iter()
                    .map(|(value, label)| (value.to_string(), label.to_string()))
                    .collect(),
                selected: stored_level(settings),
                confirm: Some(("debug".into(), DEBUG_WARNING.into())),
            },
        }])
    }

    fn set_preference(
        &mut self,
        settings: &SettingsHandle,
        key: &str,
        value: PrefValue,
    ) -> anyhow::Result<()> {
        match (key, value) {
            ("level", PrefValue::Choice(name)) if level_for(&name).is_some() => {
                if name == stored_level(settings) {
                    return Ok(());
                }
                self.apply(settings, &name)
            }
            _ => Ok(()),
        }
    }

    fn reset_preferences(&mut self, settings: &SettingsHandle) -> anyhow::Result<()> {
        settings.reset_data()?;
        if self.journal.level().is_some() {
            self.journal.set_level(level_for(DEFAULT_LEVEL));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radiola_core::config::Config;
    use radiola_core::settings::SettingsStore;

    fn handle() -> (tempfile::TempDir, SettingsHandle) {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(Config::default(), dir.path().join("config.toml"));
        (dir, store.plugin("journald_logging", true))
    }

    #[tokio::test]
    async fn unavailable_journal_fails_prepare() {
        let (_dir, settings) = handle();
        let mut plugin = JournaldLogging {
            journal: JournalControl::detached(false),
        };
        assert_eq!(
            plugin.prepare(&settings).await,
            Err(PluginError::Unavailable("journald is not available".into()))
        );
    }

    #[tokio::test]
    async fn enable_applies_stored_level_and_disable_turns_off() {
        let (_dir, settings) = handle();
        let journal = JournalControl::detached(true);
        let mut plugin = JournaldLogging {
            journal: journal.clone(),
        };

        plugin.enable(&settings).await.unwrap();
        assert_eq!(journal.level(), Some(Level::INFO));
        assert_eq!(settings.data(), "verbose");

        plugin
            .set_preference(&settings, "level", PrefValue::Choice("debug".into()))
            .unwrap();
        assert_eq!(journal.level(), Some(Level::DEBUG));
        assert_eq!(settings.data(), "debug");

        plugin
            .set_preference(&settings, "level", PrefValue::Choice("loud".into()))
            .unwrap();
        assert_eq!(settings.data(), "debug");

        plugin.disable().await.unwrap();
        assert_eq!(journal.level(), None);
    }

    #[test]
    fn debug_choice_needs_confirmation() {
        let (_dir, settings) = handle();
        let plugin = JournaldLogging {
            journal: JournalControl::detached(true),
        };
        let prefs = plugin.preferences(&settings).unwrap();
        match &prefs[0].kind {
            PrefKind::Choice {
                selected, confirm, ..
            } => {
                assert_eq!(selected, "verbose");
                assert_eq!(confirm.as_ref().map(|(v, _)| v.as_str()), Some("debug"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
