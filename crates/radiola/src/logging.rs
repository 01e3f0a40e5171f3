//! tracing setup: log file, the in-app log panel and the systemd journal.

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use radiola_core::platform::APP_ID;

use crate::window::WindowEvent;

/// Forwards WARN and ERROR events to the log panel.
pub struct UiLogLayer {
    sender: broadcast::Sender<WindowEvent>,
}

impl UiLogLayer {
    pub fn new(sender: broadcast::Sender<WindowEvent>) -> Self {
        Self { sender }
    }
}

impl<S> Layer<S> for UiLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let level = event.metadata().level();
        if !matches!(*level, Level::WARN | Level::ERROR) {
            return;
        }

        let mut message = format!("{} [{}] ", chrono::Local::now().format("%H:%M:%S"), level);
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        // no receivers is fine
        let _ = self.sender.send(WindowEvent::Log(message));
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

const OFF: u8 = 0;

fn rank(level: &Level) -> u8 {
    match *level {
        Level::ERROR => 1,
        Level::WARN => 2,
        Level::INFO => 3,
        Level::DEBUG => 4,
        Level::TRACE => 5,
    }
}

/// The journal layer, switched on and off at runtime.
pub struct JournaldSwitch {
    inner: Option<tracing_journald::Layer>,
    max: Arc<AtomicU8>,
}

impl JournaldSwitch {
    fn passes(&self, level: &Level) -> bool {
        let max = self.max.load(Ordering::Relaxed);
        max != OFF && rank(level) <= max
    }
}

impl<S> Layer<S> for JournaldSwitch
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: Context<'_, S>,
    ) {
        if let Some(inner) = &self.inner {
            inner.on_new_span(attrs, id, ctx);
        }
    }

    fn on_record(
        &self,
        id: &tracing::span::Id,
        values: &tracing::span::Record<'_>,
        ctx: Context<'_, S>,
    ) {
        if let Some(inner) = &self.inner {
            inner.on_record(id, values, ctx);
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        if let Some(inner) = &self.inner {
            if self.passes(event.metadata().level()) {
                inner.on_event(event, ctx);
            }
        }
    }
}

/// Handle used by the journald plugin.
#[derive(Clone, Debug)]
pub struct JournalControl {
    available: bool,
    max: Arc<AtomicU8>,
}

impl JournalControl {
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// `None` turns journal output off.
    pub fn set_level(&self, level: Option<Level>) {
        let value = level.as_ref().map(rank).unwrap_or(OFF);
        self.max.store(value, Ordering::Relaxed);
    }

    pub fn level(&self) -> Option<Level> {
        match self.max.load(Ordering::Relaxed) {
            1 => Some(Level::ERROR),
            2 => Some(Level::WARN),
            3 => Some(Level::INFO),
            4 => Some(Level::DEBUG),
            5 => Some(Level::TRACE),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn detached(available: bool) -> Self {
        Self {
            available,
            max: Arc::new(AtomicU8::new(OFF)),
        }
    }
}

fn journald_switch() -> (JournaldSwitch, JournalControl) {
    let inner = tracing_journald::layer()
        .map(|layer| layer.with_syslog_identifier(APP_ID.to_string()))
        .ok();
    let max = Arc::new(AtomicU8::new(OFF));
    let control = JournalControl {
        available: inner.is_some(),
        max: max.clone(),
    };
    (JournaldSwitch { inner, max }, control)
}

fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info,radiola=debug,radiola_core=debug",
        1 => "debug,hyper_util=warn,reqwest=warn,hyper=warn,zbus=info",
        _ => "trace",
    }
}

/// Install the global subscriber.  `RUST_LOG` wins over `-v` flags.
pub fn init(
    log_path: &Path,
    verbosity: u8,
    events: broadcast::Sender<WindowEvent>,
) -> anyhow::Result<JournalControl> {
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let (journald, control) = journald_switch();

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(UiLogLayer::new(events))
        .with(journald)
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity))),
        )
        .try_init()?;

    Ok(control)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_layer_forwards_only_warnings_and_errors() {
        let (tx, mut rx) = broadcast::channel(8);
        let subscriber = tracing_subscriber::registry().with(UiLogLayer::new(tx));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("chatty");
            tracing::warn!(station = "Groove Salad", "stream stalled");
        });

        match rx.try_recv().unwrap() {
            WindowEvent::Log(line) => {
                assert!(line.contains("[WARN] stream stalled"));
                assert!(line.contains("station=\"Groove Salad\""));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn journal_level_round_trips_and_gates() {
        let control = JournalControl::detached(false);
        assert_eq!(control.level(), None);
        control.set_level(Some(Level::INFO));
        assert_eq!(control.level(), Some(Level::INFO));

        let switch = JournaldSwitch {
            inner: None,
            max: control.max.clone(),
        };
        assert!(switch.passes(&Level::WARN));
        assert!(switch.passes(&Level::INFO));
        assert!(!switch.passes(&Level::DEBUG));

        control.set_level(None);
        assert!(!switch.passes(&Level::ERROR));
    }

    #[test]
    fn verbosity_raises_default_filter() {
        assert!(default_filter(0).starts_with("info"));
        assert!(default_filter(1).starts_with("debug"));
        assert_eq!(default_filter(5), "trace");
    }
}
