//! PreferencesDialog: a plugin's toggles and choices.
//!
//! A choice may name one value that needs a yes/no confirmation; picking it
//! shows the question and only applies the value on "y".

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
    plugin::{PrefItem, PrefKind, PrefValue},
    theme::{style_selected_focused, C_FILTER_FG, C_MUTED, C_PRIMARY, C_SECONDARY},
    widgets::pane_chrome::{centered, dialog_frame},
};

struct Pending {
    key: String,
    value: String,
    question: String,
}

pub struct PreferencesDialog {
    plugin: String,
    items: Vec<PrefItem>,
    selected: usize,
    pending: Option<Pending>,
}

impl PreferencesDialog {
    pub fn new() -> Self {
        Self {
            plugin: String::new(),
            items: Vec::new(),
            selected: 0,
            pending: None,
        }
    }

    pub fn open(&mut self, plugin: &str, items: Vec<PrefItem>) {
        self.plugin = plugin.to_string();
        self.items = items;
        self.selected = 0;
        self.pending = None;
    }

    /// Refresh values after the plugin applied a change.
    pub fn update(&mut self, items: Vec<PrefItem>) {
        self.items = items;
        self.selected = self.selected.min(self.items.len().saturating_sub(1));
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    fn set(&self, key: &str, value: PrefValue) -> Vec<Action> {
        vec![Action::SetPreference {
            plugin: self.plugin.clone(),
            key: key.to_string(),
            value,
        }]
    }

    /// Step the selected choice by `delta` options.
    fn step_choice(&mut self, delta: isize) -> Vec<Action> {
        let Some(item) = self.items.get(self.selected) else {
            return vec![];
        };
        let PrefKind::Choice {
            options,
            selected,
            confirm,
        } = &item.kind
        else {
            return vec![];
        };
        if options.is_empty() {
            return vec![];
        }
        let pos = options.iter().position(|(v, _)| v == selected).unwrap_or(0) as isize;
        let next = (pos + delta).rem_euclid(options.len() as isize) as usize;
        let value = options[next].0.clone();
        if let Some((needs, question)) = confirm {
            if *needs == value {
                self.pending = Some(Pending {
                    key: item.key.clone(),
                    value,
                    question: question.clone(),
                });
                return vec![];
            }
        }
        let key = item.key.clone();
        self.set(&key, PrefValue::Choice(value))
    }
}

impl Component for PreferencesDialog {
    fn id(&self) -> ComponentId {
        ComponentId::PreferencesDialog
    }

    fn handle_key(&mut self, key: KeyEvent, _state: &AppState) -> Vec<Action> {
        if let Some(pending) = self.pending.take() {
            return match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                    self.set(&pending.key, PrefValue::Choice(pending.value))
                }
                _ => vec![],
            };
        }
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                self.selected = (self.selected + 1).min(self.items.len().saturating_sub(1))
            }
            KeyCode::Char(' ') | KeyCode::Enter => {
                if let Some(PrefItem {
                    key,
                    kind: PrefKind::Toggle(value),
                    ..
                }) = self.items.get(self.selected)
                {
                    return self.set(key, PrefValue::Bool(!value));
                }
                return self.step_choice(1);
            }
            KeyCode::Right | KeyCode::Char('l') => return self.step_choice(1),
            KeyCode::Left | KeyCode::Char('h') => return self.step_choice(-1),
            KeyCode::Char('r') => return vec![Action::ResetPreferences(self.plugin.clone())],
            KeyCode::Esc | KeyCode::Char('q') => return vec![Action::Open(crate::action::Overlay::Plugins)],
            _ => {}
        }
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, _focused: bool, _state: &AppState) {
        let popup = centered(area, 64, (self.items.len() as u16 + 6).clamp(8, 20));
        let title = format!("{} preferences", self.plugin);
        let inner = dialog_frame(frame, popup, &title);

        if let Some(pending) = &self.pending {
            let lines = vec![
                Line::from(Span::styled(pending.question.clone(), Style::default().fg(C_PRIMARY))),
                Line::raw(""),
                Line::from(Span::styled("  [y] Yes   [n] No", Style::default().fg(C_FILTER_FG))),
            ];
            frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
            return;
        }

        let lines: Vec<Line> = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let label_style = if i == self.selected {
                    style_selected_focused()
                } else {
                    Style::default().fg(C_PRIMARY)
                };
                let value = match &item.kind {
                    PrefKind::Toggle(on) => {
                        if *on { "[x]".to_string() } else { "[ ]".to_string() }
                    }
                    PrefKind::Choice {
                        options, selected, ..
                    } => {
                        let label = options
                            .iter()
                            .find(|(v, _)| v == selected)
                            .map(|(_, l)| l.as_str())
                            .unwrap_or(selected.as_str());
                        format!("‹ {} ›", label)
                    }
                };
                Line::from(vec![
                    Span::styled(format!(" {} ", value), Style::default().fg(C_SECONDARY)),
                    Span::styled(item.label.clone(), label_style),
                ])
            })
            .chain(std::iter::once(Line::raw("")))
            .chain(std::iter::once(Line::from(Span::styled(
                " r reset to defaults",
                Style::default().fg(C_MUTED),
            ))))
            .collect();
        frame.render_widget(Paragraph::new(lines), inner);
    }
}
