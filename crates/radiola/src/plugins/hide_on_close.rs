//! Hide instead of quitting when a GNOME shell media extension can bring
//! the player back.
//!
//! Once no compatible extension is left, and whenever the plugin is
//! disabled, a hidden window is shown and raised so nothing is left
//! running without a way back to it.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use radiola_core::settings::SettingsHandle;

use crate::plugin::{Plugin, PluginContext, PluginError};
use crate::window::Window;

const WHITE_LIST: [&str; 2] = ["mediaplayer@patapon.info", "laine@knasher.gmail.com"];
const SCHEMA: &str = "org.gnome.shell";
const KEY: &str = "enabled-extensions";

/// Strings inside a GVariant `as` literal such as `['a@b', "c@d"]`.
pub fn parse_extension_list(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\'' || c == '"' {
            let item: String = chars.by_ref().take_while(|&next| next != c).collect();
            out.push(item);
        }
    }
    out
}

pub fn has_compatible(extensions: &[String]) -> bool {
    extensions.iter().any(|e| WHITE_LIST.contains(&e.as_str()))
}

async fn compatible_extension_enabled() -> bool {
    let output = match Command::new("gsettings").args(["get", SCHEMA, KEY]).output().await {
        Ok(o) if o.status.success() => o,
        Ok(o) => {
            debug!("gsettings get failed: {}", String::from_utf8_lossy(&o.stderr).trim());
            return false;
        }
        Err(e) => {
            debug!("gsettings not available: {}", e);
            return false;
        }
    };
    has_compatible(&parse_extension_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Apply the current extension state to the window.
fn apply(window: &Window, compatible: bool) {
    if compatible {
        window.set_close_hides(true);
        return;
    }
    window.set_close_hides(false);
    if !window.is_visible() {
        window.set_visible(true);
        window.bring_to_top();
    }
}

pub struct HideOnClose {
    window: Window,
    task: Option<JoinHandle<()>>,
}

impl HideOnClose {
    pub fn create(ctx: &PluginContext) -> Box<dyn Plugin> {
        Box::new(Self {
            window: ctx.window.clone(),
            task: None,
        })
    }
}

async fn monitor(window: Window) {
    let mut child = match Command::new("gsettings")
        .args(["monitor", SCHEMA, KEY])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!("Cannot watch {}: {}", KEY, e);
            return;
        }
    };
    let Some(stdout) = child.stdout.take() else {
        return;
    };
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let compatible = has_compatible(&parse_extension_list(&line));
        debug!("{} changed, compatible extension: {}", KEY, compatible);
        apply(&window, compatible);
    }
}

#[async_trait]
impl Plugin for HideOnClose {
    fn name(&self) -> &'static str {
        "hide_on_close"
    }

    fn description(&self) -> &'static str {
        "Hide to GNOME shell Media extension."
    }

    async fn prepare(&mut self, _settings: &SettingsHandle) -> Result<(), PluginError> {
        if compatible_extension_enabled().await {
            Ok(())
        } else {
            Err(PluginError::Unavailable(
                "No compatible or enabled extension found".into(),
            ))
        }
    }

    async fn enable(&mut self, _settings: &SettingsHandle) -> anyhow::Result<()> {
        apply(&self.window, true);
        self.task = Some(tokio::spawn(monitor(self.window.clone())));
        Ok(())
    }

    async fn disable(&mut self) -> anyhow::Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        apply(&self.window, false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::tests::harness;
    use crate::window::WindowRequest;

    #[test]
    fn parses_gvariant_string_arrays() {
        assert_eq!(
            parse_extension_list("['mediaplayer@patapon.info', \"dash@x\"]"),
            vec!["mediaplayer@patapon.info".to_string(), "dash@x".to_string()]
        );
        assert!(parse_extension_list("@as []").is_empty());
        assert_eq!(
            parse_extension_list("enabled-extensions: ['laine@knasher.gmail.com']"),
            vec!["laine@knasher.gmail.com".to_string()]
        );
    }

    #[test]
    fn only_listed_extensions_count() {
        assert!(has_compatible(&["laine@knasher.gmail.com".to_string()]));
        assert!(!has_compatible(&["dash-to-dock@micxgx.gmail.com".to_string()]));
        assert!(!has_compatible(&[]));
    }

    #[tokio::test]
    async fn losing_the_extension_restores_a_hidden_window() {
        let mut h = harness();
        apply(&h.window, true);
        assert!(h.window.close_hides());
        h.window.request_close();
        assert_eq!(h.ui_rx.recv().await, Some(WindowRequest::SetVisible(false)));

        apply(&h.window, false);
        assert!(!h.window.close_hides());
        assert!(h.window.is_visible());
        assert_eq!(h.ui_rx.recv().await, Some(WindowRequest::SetVisible(true)));
        assert_eq!(h.ui_rx.recv().await, Some(WindowRequest::Raise));
    }

    #[tokio::test]
    async fn disabling_while_hidden_shows_the_window() {
        let mut h = harness();
        let mut plugin = HideOnClose {
            window: h.window.clone(),
            task: None,
        };
        h.window.set_close_hides(true);
        h.window.request_close();
        assert_eq!(h.ui_rx.recv().await, Some(WindowRequest::SetVisible(false)));

        plugin.disable().await.unwrap();
        assert!(h.window.is_visible());
        assert!(!h.window.close_hides());
        assert_eq!(h.ui_rx.recv().await, Some(WindowRequest::SetVisible(true)));
    }
}
