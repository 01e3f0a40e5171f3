//! History: songs heard this session, newest first.

use ratatui::crossterm::event::{KeyCode, KeyEvent, MouseEvent, MouseEventKind};
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    components::now_playing::rating_marks,
    theme::{C_MUTED, C_PLAYING, C_PRIMARY, C_SECONDARY, C_SELECTION_BG},
    widgets::pane_chrome::pane_chrome,
};

pub struct History {
    selected: usize,
    scroll_offset: usize,
}

impl History {
    pub fn new() -> Self {
        Self {
            selected: 0,
            scroll_offset: 0,
        }
    }

    fn clamp(&mut self, total: usize, height: usize) {
        if self.selected >= total {
            self.selected = total.saturating_sub(1);
        }
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
        } else if height > 0 && self.selected >= self.scroll_offset + height {
            self.scroll_offset = self.selected + 1 - height;
        }
    }
}

impl Component for History {
    fn id(&self) -> ComponentId {
        ComponentId::History
    }

    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        let total = state.player.history.len();
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                self.selected = (self.selected + 1).min(total.saturating_sub(1))
            }
            KeyCode::Home | KeyCode::Char('g') => self.selected = 0,
            KeyCode::End | KeyCode::Char('G') => self.selected = total.saturating_sub(1),
            KeyCode::Enter => {
                // newest first on screen
                let song = total
                    .checked_sub(self.selected + 1)
                    .and_then(|i| state.player.history.get(i));
                if let Some(song) = song {
                    return vec![Action::CopyToClipboard(song.display())];
                }
            }
            _ => {}
        }
        vec![]
    }

    fn handle_mouse(&mut self, event: MouseEvent, _area: Rect, state: &AppState) -> Vec<Action> {
        let total = state.player.history.len();
        match event.kind {
            MouseEventKind::ScrollUp => self.selected = self.selected.saturating_sub(1),
            MouseEventKind::ScrollDown => {
                self.selected = (self.selected + 1).min(total.saturating_sub(1))
            }
            _ => {}
        }
        vec![]
    }

    fn on_action(&mut self, action: &Action, _state: &AppState) -> Vec<Action> {
        // jump back to the newest song when playback moves on
        if matches!(action, Action::Next | Action::PlayStation(_)) {
            self.selected = 0;
            self.scroll_offset = 0;
        }
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        let block = pane_chrome("history", focused, None);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let history = &state.player.history;
        if history.is_empty() {
            frame.render_widget(
                Paragraph::new(Span::styled("  no songs yet", Style::default().fg(C_MUTED))),
                inner,
            );
            return;
        }
        let height = inner.height as usize;
        self.clamp(history.len(), height);
        let current = state.current_song().map(|s| s.index);

        let lines: Vec<Line> = history
            .iter()
            .rev()
            .enumerate()
            .skip(self.scroll_offset)
            .take(height)
            .map(|(i, song)| {
                let is_current = Some(song.index) == current;
                let mut style = Style::default().fg(if is_current { C_PLAYING } else { C_PRIMARY });
                if i == self.selected && focused {
                    style = style.bg(C_SELECTION_BG).add_modifier(Modifier::BOLD);
                }
                let mut spans = vec![
                    Span::styled(
                        format!(" {} ", song.started_at.format("%H:%M")),
                        Style::default().fg(C_MUTED),
                    ),
                    Span::styled(song.display(), style),
                ];
                spans.extend(rating_marks(song));
                if !song.album.is_empty() {
                    spans.push(Span::styled(
                        format!("  {}", song.album),
                        Style::default().fg(C_SECONDARY),
                    ));
                }
                Line::from(spans)
            })
            .collect();
        frame.render_widget(Paragraph::new(lines), inner);
    }
}
