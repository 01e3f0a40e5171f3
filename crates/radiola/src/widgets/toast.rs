//! Transient status messages in the top-right corner, plus one persistent
//! spinner for background work.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Clear, Paragraph},
    Frame,
};

use crate::theme::{C_TOAST_ERROR, C_TOAST_INFO, C_TOAST_SUCCESS, C_TOAST_WARNING};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    fn color(self) -> ratatui::style::Color {
        match self {
            Severity::Info => C_TOAST_INFO,
            Severity::Success => C_TOAST_SUCCESS,
            Severity::Warning => C_TOAST_WARNING,
            Severity::Error => C_TOAST_ERROR,
        }
    }

    fn icon(self) -> &'static str {
        match self {
            Severity::Info => "·",
            Severity::Success => "✓",
            Severity::Warning => "!",
            Severity::Error => "✗",
        }
    }
}

struct Toast {
    message: String,
    severity: Severity,
    expires: Instant,
}

struct Spinner {
    message: String,
    frame: usize,
}

const SPINNER_FRAMES: &[&str] = &["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];
const MAX_VISIBLE: usize = 4;

#[derive(Default)]
pub struct ToastManager {
    toasts: VecDeque<Toast>,
    spinner: Option<Spinner>,
}

impl ToastManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, message: impl Into<String>, severity: Severity, duration: Duration) {
        let msg = message.into();
        self.toasts.retain(|t| t.message != msg);
        self.toasts.push_back(Toast {
            message: msg,
            severity,
            expires: Instant::now() + duration,
        });
        while self.toasts.len() > MAX_VISIBLE * 2 {
            self.toasts.pop_front();
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Info, Duration::from_secs(3));
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Success, Duration::from_secs(3));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Warning, Duration::from_secs(4));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(message, Severity::Error, Duration::from_secs(5));
    }

    /// Start or replace the spinner; it stays until dismissed.
    pub fn spinner(&mut self, message: impl Into<String>) {
        self.spinner = Some(Spinner {
            message: message.into(),
            frame: 0,
        });
    }

    pub fn dismiss_spinner(&mut self) {
        self.spinner = None;
    }

    pub fn has_spinner(&self) -> bool {
        self.spinner.is_some()
    }

    /// Drop expired toasts and advance the spinner.
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.toasts.retain(|t| t.expires > now);
        if let Some(s) = self.spinner.as_mut() {
            s.frame = (s.frame + 1) % SPINNER_FRAMES.len();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty() && self.spinner.is_none()
    }

    pub fn draw(&self, frame: &mut Frame, area: Rect) {
        if self.is_empty() {
            return;
        }
        let max_width = (area.width / 2).clamp(30, 60);
        let mut rows: Vec<(String, ratatui::style::Color)> = Vec::new();
        if let Some(s) = &self.spinner {
            rows.push((
                format!(" {} {} ", SPINNER_FRAMES[s.frame], s.message),
                C_TOAST_INFO,
            ));
        }
        for toast in self.toasts.iter().rev().take(MAX_VISIBLE) {
            rows.push((
                format!(" {} {} ", toast.severity.icon(), toast.message),
                toast.severity.color(),
            ));
        }

        let mut y = area.y + 1;
        for (text, color) in rows {
            if y >= area.y + area.height {
                break;
            }
            let w = (text.chars().count() as u16).min(max_width).min(area.width);
            let toast_area = Rect {
                x: area.x + area.width.saturating_sub(w + 1),
                y,
                width: w,
                height: 1,
            };
            frame.render_widget(Clear, toast_area);
            frame.render_widget(
                Paragraph::new(Line::from(Span::styled(
                    text,
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ))),
                toast_area,
            );
            y += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_collapse_and_expired_toasts_go() {
        let mut t = ToastManager::new();
        t.info("copied");
        t.info("copied");
        assert_eq!(t.toasts.len(), 1);
        t.push("gone", Severity::Warning, Duration::ZERO);
        t.tick();
        assert_eq!(t.toasts.len(), 1);
    }

    #[test]
    fn spinner_lives_until_dismissed() {
        let mut t = ToastManager::new();
        t.spinner("Searching...");
        t.tick();
        assert!(t.has_spinner());
        t.dismiss_spinner();
        assert!(t.is_empty());
    }
}
