//! Single-line text entry built on tui-input, used by the stations popover
//! and the search dialog.

use ratatui::crossterm::event::{Event, KeyCode, KeyEvent};
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use tui_input::{backend::crossterm::EventHandler, Input};

use crate::theme::{C_FILTER_BG, C_FILTER_FG, C_MUTED};

#[derive(Debug, PartialEq)]
pub enum InputAction {
    Changed(String),
    Confirmed,
    Cancelled,
    /// Key consumed without changing the text (cursor movement).
    None,
}

pub struct FilterInput {
    input: Input,
    prompt: &'static str,
    placeholder: String,
}

impl FilterInput {
    pub fn new(prompt: &'static str, placeholder: impl Into<String>) -> Self {
        Self {
            input: Input::default(),
            prompt,
            placeholder: placeholder.into(),
        }
    }

    pub fn clear(&mut self) {
        self.input = Input::default();
    }

    pub fn text(&self) -> &str {
        self.input.value()
    }

    /// Esc clears the text first and cancels only when already empty.
    pub fn handle_key(&mut self, key: KeyEvent) -> InputAction {
        match key.code {
            KeyCode::Esc => {
                if self.input.value().is_empty() {
                    InputAction::Cancelled
                } else {
                    self.clear();
                    InputAction::Changed(String::new())
                }
            }
            KeyCode::Enter => InputAction::Confirmed,
            _ => {
                let before = self.input.value().to_string();
                self.input.handle_event(&Event::Key(key));
                if self.input.value() == before {
                    InputAction::None
                } else {
                    InputAction::Changed(self.input.value().to_string())
                }
            }
        }
    }

    pub fn draw(&self, frame: &mut Frame, area: Rect, focused: bool) {
        let prefix_w = self.prompt.chars().count() + 1;
        let scroll = self
            .input
            .visual_scroll((area.width as usize).saturating_sub(prefix_w + 1));
        let value = self.input.value();
        let display = if value.is_empty() {
            Span::styled(
                format!("{} {}", self.prompt, self.placeholder),
                Style::default().fg(C_MUTED),
            )
        } else {
            let visible: String = value.chars().skip(scroll).collect();
            Span::styled(
                format!("{} {}", self.prompt, visible),
                Style::default().fg(C_FILTER_FG),
            )
        };
        frame.render_widget(
            Paragraph::new(Line::from(vec![display])).style(Style::default().bg(C_FILTER_BG)),
            area,
        );

        if focused && area.width > 0 {
            let cursor_x = area.x + (prefix_w + self.input.visual_cursor() - scroll) as u16;
            frame.set_cursor_position((cursor_x.min(area.x + area.width - 1), area.y));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyModifiers;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn typing_reports_changes_and_esc_clears_then_cancels() {
        let mut input = FilterInput::new("/", "filter");
        assert_eq!(
            input.handle_key(key(KeyCode::Char('a'))),
            InputAction::Changed("a".into())
        );
        assert_eq!(input.handle_key(key(KeyCode::Left)), InputAction::None);
        assert_eq!(
            input.handle_key(key(KeyCode::Esc)),
            InputAction::Changed(String::new())
        );
        assert!(input.text().is_empty());
        assert_eq!(input.handle_key(key(KeyCode::Esc)), InputAction::Cancelled);
        assert_eq!(input.handle_key(key(KeyCode::Enter)), InputAction::Confirmed);
    }
}
