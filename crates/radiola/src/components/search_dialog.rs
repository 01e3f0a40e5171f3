//! SearchDialog: find stations in the directory and add them.
//!
//! Typing restarts a 350 ms timer; the search runs when it expires.  Every
//! edit bumps a generation counter so results of an older query are
//! dropped, and clearing the entry drops whatever is still in flight.

use std::time::{Duration, Instant};

use ratatui::crossterm::event::{KeyCode, KeyEvent};
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
    search::SearchResult,
    theme::{style_selected_focused, C_ERROR, C_MUTED, C_PRIMARY, C_SECONDARY},
    widgets::{
        filter_input::{FilterInput, InputAction},
        pane_chrome::{centered, dialog_frame},
        scrollable_list::ScrollableList,
    },
};

pub const DEBOUNCE: Duration = Duration::from_millis(350);

pub struct SearchDialog {
    entry: FilterInput,
    results: ScrollableList<SearchResult>,
    generation: u64,
    /// Query the shown (or awaited) results belong to; empty when cleared.
    query: String,
    deadline: Option<Instant>,
    searching: bool,
    error: Option<String>,
}

impl SearchDialog {
    pub fn new() -> Self {
        Self {
            entry: FilterInput::new("Search:", "station name or genre"),
            results: ScrollableList::new(|_: &SearchResult, _: &str| true),
            generation: 0,
            query: String::new(),
            deadline: None,
            searching: false,
            error: None,
        }
    }

    /// Fresh dialog state; anything in flight is dropped.
    pub fn reset(&mut self) {
        self.entry.clear();
        self.clear_results();
    }

    fn clear_results(&mut self) {
        self.generation += 1;
        self.query.clear();
        self.deadline = None;
        self.searching = false;
        self.error = None;
        self.results.set_items(Vec::new());
    }

    pub fn text_changed(&mut self, text: &str, now: Instant) {
        if text.trim().is_empty() {
            self.clear_results();
            return;
        }
        self.generation += 1;
        self.deadline = Some(now + DEBOUNCE);
    }

    /// Start the pending search once its timer ran out.
    pub fn poll(&mut self, now: Instant) -> Option<Action> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.deadline = None;
        self.query = self.entry.text().trim().to_string();
        self.begin();
        Some(Action::Search {
            generation: self.generation,
            query: self.query.clone(),
        })
    }

    fn begin(&mut self) {
        self.searching = true;
        self.error = None;
        self.results.set_items(Vec::new());
    }

    /// Returns false when the result was stale and dropped.
    pub fn apply_results(&mut self, generation: u64, result: Result<Vec<SearchResult>, String>) -> bool {
        if generation != self.generation || self.query.is_empty() {
            return false;
        }
        self.searching = false;
        match result {
            Ok(results) => {
                self.results.set_items(results);
                self.results.select_first();
            }
            Err(e) => self.error = Some(e),
        }
        true
    }

    pub fn is_searching(&self) -> bool {
        self.searching
    }

    pub fn selected(&self) -> Option<&SearchResult> {
        self.results.selected_item()
    }

    /// OK is only offered with a selected row.
    pub fn ok_enabled(&self) -> bool {
        self.selected().is_some()
    }

    fn confirm(&mut self) -> Vec<Action> {
        match self.selected().cloned() {
            Some(SearchResult::Station(station)) => {
                vec![Action::AddStation(station), Action::CloseOverlay]
            }
            Some(SearchResult::Genre { name, .. }) => {
                self.generation += 1;
                self.deadline = None;
                self.query = name.clone();
                self.begin();
                vec![Action::SearchTag {
                    generation: self.generation,
                    tag: name,
                }]
            }
            None => vec![],
        }
    }
}

impl Component for SearchDialog {
    fn id(&self) -> ComponentId {
        ComponentId::SearchDialog
    }

    fn handle_key(&mut self, key: KeyEvent, _state: &AppState) -> Vec<Action> {
        match key.code {
            KeyCode::Up => self.results.select_up(1),
            KeyCode::Down => self.results.select_down(1),
            KeyCode::PageUp => self.results.select_up(10),
            KeyCode::PageDown => self.results.select_down(10),
            _ => match self.entry.handle_key(key) {
                InputAction::Changed(text) => self.text_changed(&text, Instant::now()),
                InputAction::Confirmed => return self.confirm(),
                InputAction::Cancelled => {
                    self.reset();
                    return vec![Action::CloseOverlay];
                }
                InputAction::None => {}
            },
        }
        vec![]
    }

    fn tick(&mut self, _state: &AppState) -> Vec<Action> {
        self.poll(Instant::now()).into_iter().collect()
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, _focused: bool, _state: &AppState) {
        let popup = centered(area, 64, 20);
        let inner = dialog_frame(frame, popup, "add station");
        if inner.height < 4 {
            return;
        }
        self.entry.draw(frame, Rect { height: 1, ..inner }, true);

        let list_area = Rect {
            y: inner.y + 2,
            height: inner.height - 3,
            ..inner
        };
        let rows = list_area.height as usize;
        if self.searching {
            frame.render_widget(
                Paragraph::new(Span::styled("  Searching...", Style::default().fg(C_SECONDARY))),
                list_area,
            );
        } else if let Some(err) = &self.error {
            frame.render_widget(
                Paragraph::new(Span::styled(format!("  {}", err), Style::default().fg(C_ERROR))),
                list_area,
            );
        } else if self.results.is_empty() && !self.query.is_empty() {
            frame.render_widget(
                Paragraph::new(Span::styled("  no results", Style::default().fg(C_MUTED))),
                list_area,
            );
        } else {
            self.results.ensure_visible(rows);
            let selected = self.results.selected_in_view(rows);
            let lines: Vec<Line> = self
                .results
                .visible_items(rows)
                .enumerate()
                .map(|(row, result)| {
                    let (name, qualifier) = result.label_parts();
                    let base = if row == selected {
                        style_selected_focused()
                    } else {
                        Style::default().fg(C_PRIMARY)
                    };
                    Line::from(vec![
                        Span::styled(format!(" {}", name), base.add_modifier(Modifier::BOLD)),
                        Span::styled(format!(" {}", qualifier), Style::default().fg(C_SECONDARY)),
                    ])
                })
                .collect();
            frame.render_widget(Paragraph::new(lines), list_area);
        }

        let ok_style = if self.ok_enabled() {
            Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(C_MUTED)
        };
        frame.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled(" [Esc] Cancel  ", Style::default().fg(C_SECONDARY)),
                Span::styled("[Enter] OK", ok_style),
            ]))
            .right_aligned(),
            Rect {
                y: inner.y + inner.height - 1,
                height: 1,
                ..inner
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radiola_core::protocol::Station;
    use ratatui::crossterm::event::KeyModifiers;

    fn type_text(dialog: &mut SearchDialog, text: &str) {
        let state = AppState::default();
        for c in text.chars() {
            dialog.handle_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE), &state);
        }
    }

    fn station(name: &str) -> SearchResult {
        SearchResult::Station(Station::new(name, format!("http://{}/", name)))
    }

    #[test]
    fn search_waits_for_the_debounce() {
        let mut d = SearchDialog::new();
        let start = Instant::now();
        type_text(&mut d, "jazz");
        d.text_changed("jazz", start);
        assert_eq!(d.poll(start + Duration::from_millis(200)), None);
        // another keystroke restarts the timer
        d.text_changed("jazz", start + Duration::from_millis(300));
        assert_eq!(d.poll(start + Duration::from_millis(400)), None);
        let action = d.poll(start + Duration::from_millis(650));
        assert!(matches!(action, Some(Action::Search { ref query, .. }) if query == "jazz"));
        assert!(d.is_searching());
        assert_eq!(d.poll(start + Duration::from_secs(5)), None);
    }

    #[test]
    fn stale_and_cleared_results_are_dropped() {
        let mut d = SearchDialog::new();
        let t = Instant::now();
        type_text(&mut d, "ambient");
        d.text_changed("ambient", t);
        let Some(Action::Search { generation, .. }) = d.poll(t + DEBOUNCE) else {
            panic!("no search started");
        };

        // user kept typing: the old answer no longer applies
        d.text_changed("ambient dub", t + DEBOUNCE);
        assert!(!d.apply_results(generation, Ok(vec![station("a")])));

        let Some(Action::Search { generation, .. }) = d.poll(t + DEBOUNCE * 3) else {
            panic!("no search started");
        };
        d.text_changed("", t + DEBOUNCE * 3);
        assert!(!d.apply_results(generation, Ok(vec![station("b")])));
        assert!(d.selected().is_none());
        assert!(!d.is_searching());
    }

    #[test]
    fn ok_needs_a_selection() {
        let mut d = SearchDialog::new();
        let t = Instant::now();
        type_text(&mut d, "x");
        d.text_changed("x", t);
        let Some(Action::Search { generation, .. }) = d.poll(t + DEBOUNCE) else {
            panic!("no search started");
        };
        assert!(!d.ok_enabled());
        assert!(d.confirm().is_empty());
        assert!(d.apply_results(generation, Ok(vec![station("kexp")])));
        assert!(d.ok_enabled());
        let actions = d.confirm();
        assert!(matches!(&actions[0], Action::AddStation(s) if s.name == "kexp"));
        assert_eq!(actions[1], Action::CloseOverlay);
    }

    #[test]
    fn choosing_a_genre_searches_its_stations() {
        let mut d = SearchDialog::new();
        let t = Instant::now();
        type_text(&mut d, "dub");
        d.text_changed("dub", t);
        let Some(Action::Search { generation, .. }) = d.poll(t + DEBOUNCE) else {
            panic!("no search started");
        };
        let genre = SearchResult::Genre {
            name: "dub".into(),
            station_count: 40,
        };
        assert!(d.apply_results(generation, Ok(vec![genre])));
        let actions = d.confirm();
        let [Action::SearchTag { generation: tag_gen, tag }] = actions.as_slice() else {
            panic!("unexpected {:?}", actions);
        };
        assert_eq!(tag, "dub");
        assert!(d.is_searching());
        assert!(!d.apply_results(generation, Ok(vec![])));
        assert!(d.apply_results(*tag_gen, Ok(vec![station("dub fm")])));
        assert!(d.ok_enabled());
    }

    #[test]
    fn errors_are_shown_not_kept_as_results() {
        let mut d = SearchDialog::new();
        let t = Instant::now();
        type_text(&mut d, "q");
        d.text_changed("q", t);
        let Some(Action::Search { generation, .. }) = d.poll(t + DEBOUNCE) else {
            panic!("no search started");
        };
        assert!(d.apply_results(generation, Err("search timed out".into())));
        assert_eq!(d.error.as_deref(), Some("search timed out"));
        assert!(!d.ok_enabled());
    }
}
