//! LogPanel: warnings and errors captured from tracing.
//!
//! One line (the latest entry) when collapsed; a scrollable pane when open.

use ratatui::crossterm::event::{KeyCode, KeyEvent, MouseEvent, MouseEventKind};
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Clear, Paragraph, Wrap},
    Frame,
};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{C_ERROR, C_MUTED, C_SECONDARY, C_TOAST_WARNING},
    widgets::pane_chrome::pane_chrome,
};

pub struct LogPanel {
    pub expanded: bool,
    pub scroll: usize,
    last_log_count: usize,
}

impl LogPanel {
    pub fn new() -> Self {
        Self {
            expanded: false,
            scroll: 0,
            last_log_count: 0,
        }
    }

    pub fn toggle(&mut self) {
        self.expanded = !self.expanded;
        if self.expanded {
            self.scroll = usize::MAX;
        }
    }
}

fn line_style(line: &str) -> Style {
    if line.contains("[ERROR]") {
        Style::default().fg(C_ERROR)
    } else if line.contains("[WARN]") {
        Style::default().fg(C_TOAST_WARNING)
    } else {
        Style::default().fg(C_MUTED)
    }
}

impl Component for LogPanel {
    fn id(&self) -> ComponentId {
        ComponentId::LogPanel
    }

    fn handle_key(&mut self, key: KeyEvent, _state: &AppState) -> Vec<Action> {
        if !self.expanded {
            return vec![];
        }
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.scroll = self.scroll.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => self.scroll = self.scroll.saturating_add(1),
            KeyCode::PageUp => self.scroll = self.scroll.saturating_sub(10),
            KeyCode::PageDown => self.scroll = self.scroll.saturating_add(10),
            KeyCode::Home | KeyCode::Char('g') => self.scroll = 0,
            KeyCode::End | KeyCode::Char('G') => self.scroll = usize::MAX,
            _ => {}
        }
        vec![]
    }

    fn handle_mouse(&mut self, event: MouseEvent, _area: Rect, _state: &AppState) -> Vec<Action> {
        if self.expanded {
            match event.kind {
                MouseEventKind::ScrollUp => self.scroll = self.scroll.saturating_sub(1),
                MouseEventKind::ScrollDown => self.scroll = self.scroll.saturating_add(1),
                _ => {}
            }
        }
        vec![]
    }

    fn on_action(&mut self, action: &Action, _state: &AppState) -> Vec<Action> {
        if *action == Action::ToggleLogs {
            self.toggle();
        }
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        if area.height == 0 {
            return;
        }
        frame.render_widget(Clear, area);

        if !self.expanded || area.height <= 2 {
            let last = state.logs.last().map(String::as_str).unwrap_or("(no log)");
            frame.render_widget(
                Paragraph::new(Line::from(vec![
                    Span::styled(" log ", Style::default().fg(C_MUTED)),
                    Span::styled(last.to_string(), Style::default().fg(C_SECONDARY)),
                ])),
                area,
            );
            return;
        }

        let block = pane_chrome("log", focused, None);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let logs = &state.logs;
        let height = inner.height as usize;
        if logs.len() > self.last_log_count {
            // follow new entries while at the bottom
            let max_scroll = logs.len().saturating_sub(height);
            if self.scroll >= max_scroll.saturating_sub(1) {
                self.scroll = usize::MAX;
            }
            self.last_log_count = logs.len();
        }
        if logs.is_empty() {
            frame.render_widget(
                Paragraph::new(Span::styled("  no log entries yet", Style::default().fg(C_MUTED))),
                inner,
            );
            return;
        }
        self.scroll = self.scroll.min(logs.len().saturating_sub(height));

        let lines: Vec<Line> = logs
            .iter()
            .skip(self.scroll)
            .take(height)
            .map(|msg| Line::from(Span::styled(format!("  {}", msg), line_style(msg))))
            .collect();
        frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
    }
}
