//! Bottom rows: last log line and the key bindings bar.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use radiola_core::protocol::MpvHealth;

use crate::action::Overlay;
use crate::theme::{C_ACCENT, C_MODE_DIALOG, C_MODE_NORMAL, C_MUTED, C_PLAYING, C_SECONDARY, C_SEPARATOR};

pub fn mode_label(overlay: Overlay) -> &'static str {
    match overlay {
        Overlay::None => "PLAYER",
        Overlay::Stations => "STATIONS",
        Overlay::Search => "SEARCH",
        Overlay::Plugins => "PLUGINS",
        Overlay::Preferences => "PREFS",
        Overlay::Help => "HELP",
    }
}

fn keys_for(overlay: Overlay) -> &'static str {
    match overlay {
        Overlay::None => {
            " Space play/pause  n next  l/b/t/u love/ban/tired/unrate  ←→ vol  s stations  f search  p plugins  y copy  L logs  ? help  q close  Q quit"
        }
        Overlay::Stations => " type to filter  ↑↓ select  Tab sort  Enter play  Esc close",
        Overlay::Search => " type to search  ↑↓ select  Enter OK  Esc cancel",
        Overlay::Plugins => " ↑↓ select  Space toggle  Enter preferences  Esc close",
        Overlay::Preferences => " ↑↓ select  Space toggle  ←→ choose  r reset  Esc close",
        Overlay::Help => " any key closes",
    }
}

/// Last log line with an mpv health dot.
pub fn draw_log_bar(frame: &mut Frame, area: Rect, last_log: Option<&str>, health: &MpvHealth) {
    let dot = match health.badge_label() {
        Some(label) => Span::styled(format!("○ {}", label), Style::default().fg(C_ACCENT)),
        None => Span::styled("●", Style::default().fg(C_PLAYING)),
    };
    let line = Line::from(vec![
        dot,
        Span::raw(" "),
        Span::styled(last_log.unwrap_or(""), Style::default().fg(C_SECONDARY)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

pub fn draw_separator(frame: &mut Frame, area: Rect) {
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            "─".repeat(area.width as usize),
            Style::default().fg(C_SEPARATOR),
        ))),
        area,
    );
}

pub fn draw_keys_bar(frame: &mut Frame, area: Rect, overlay: Overlay) {
    let color = if overlay == Overlay::None {
        C_MODE_NORMAL
    } else {
        C_MODE_DIALOG
    };
    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", mode_label(overlay)),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(keys_for(overlay), Style::default().fg(C_MUTED)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}
