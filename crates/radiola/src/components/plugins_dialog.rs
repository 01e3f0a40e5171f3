//! PluginsDialog: enable or disable plugins and open their preferences.

use ratatui::crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Paragraph, Wrap},
    Frame,
};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{style_selected_focused, C_ERROR, C_MUTED, C_PLAYING, C_PRIMARY, C_SECONDARY},
    widgets::pane_chrome::{centered, dialog_frame},
};

pub struct PluginsDialog {
    selected: usize,
}

impl PluginsDialog {
    pub fn new() -> Self {
        Self { selected: 0 }
    }
}

impl Component for PluginsDialog {
    fn id(&self) -> ComponentId {
        ComponentId::PluginsDialog
    }

    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        let total = state.plugins.len();
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                self.selected = (self.selected + 1).min(total.saturating_sub(1))
            }
            KeyCode::Char(' ') => {
                if let Some(row) = state.plugins.get(self.selected) {
                    return vec![Action::TogglePlugin(row.name.clone())];
                }
            }
            KeyCode::Enter => {
                if let Some(row) = state.plugins.get(self.selected) {
                    if row.has_preferences {
                        return vec![Action::OpenPreferences(row.name.clone())];
                    }
                }
            }
            KeyCode::Esc | KeyCode::Char('q') => return vec![Action::CloseOverlay],
            _ => {}
        }
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, _focused: bool, state: &AppState) {
        let popup = centered(area, 70, (state.plugins.len() as u16 * 2 + 4).clamp(6, 24));
        let inner = dialog_frame(frame, popup, "plugins");
        if state.plugins.is_empty() {
            frame.render_widget(
                Paragraph::new(Span::styled("  no plugins", Style::default().fg(C_MUTED))),
                inner,
            );
            return;
        }
        self.selected = self.selected.min(state.plugins.len() - 1);

        let mut lines = Vec::new();
        for (i, row) in state.plugins.iter().enumerate() {
            let check = if row.enabled { "[x]" } else { "[ ]" };
            let name_style = if i == self.selected {
                style_selected_focused()
            } else {
                Style::default().fg(C_PRIMARY)
            };
            let mut head = vec![
                Span::styled(
                    format!(" {} ", check),
                    Style::default().fg(if row.enabled { C_PLAYING } else { C_SECONDARY }),
                ),
                Span::styled(row.name.clone(), name_style),
            ];
            if row.has_preferences {
                head.push(Span::styled("  ⚙", Style::default().fg(C_SECONDARY)));
            }
            lines.push(Line::from(head));
            let detail = match &row.error {
                Some(err) => Span::styled(format!("     {}", err), Style::default().fg(C_ERROR)),
                None => Span::styled(
                    format!("     {}", row.description),
                    Style::default().fg(C_MUTED),
                ),
            };
            lines.push(Line::from(detail));
        }
        frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::PluginRow;
    use ratatui::crossterm::event::KeyModifiers;

    fn state() -> AppState {
        let row = |name: &str, prefs: bool| PluginRow {
            name: name.into(),
            description: String::new(),
            enabled: false,
            error: None,
            has_preferences: prefs,
        };
        AppState {
            plugins: vec![row("mpris", false), row("notify", true)],
            ..Default::default()
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn space_toggles_and_enter_opens_preferences_only_when_offered() {
        let state = state();
        let mut d = PluginsDialog::new();
        assert_eq!(
            d.handle_key(key(KeyCode::Char(' ')), &state),
            vec![Action::TogglePlugin("mpris".into())]
        );
        assert!(d.handle_key(key(KeyCode::Enter), &state).is_empty());
        d.handle_key(key(KeyCode::Down), &state);
        d.handle_key(key(KeyCode::Down), &state);
        assert_eq!(
            d.handle_key(key(KeyCode::Enter), &state),
            vec![Action::OpenPreferences("notify".into())]
        );
    }
}
