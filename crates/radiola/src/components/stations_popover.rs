//! StationsPopover: filterable, optionally sorted station picker.
//!
//! Rows show the station name cut to 15 columns and, for regular stations,
//! whether they take part in QuickMix.  The list keeps insertion order
//! unless sorting is on, in which case QuickMix comes first and the rest
//! are ordered by name ignoring ASCII case.

use std::cmp::Ordering;

use ratatui::crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use unicode_width::UnicodeWidthChar;

use radiola_core::protocol::Station;

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{style_selected_focused, C_MUTED, C_PLAYING, C_PRIMARY, C_SECONDARY},
    widgets::{
        filter_input::{FilterInput, InputAction},
        pane_chrome::{centered, dialog_frame},
        scrollable_list::ScrollableList,
    },
};

const NAME_COLUMNS: usize = 15;

pub fn station_matches(station: &Station, query: &str) -> bool {
    query.is_empty() || station.name.to_lowercase().contains(&query.to_lowercase())
}

pub fn compare_stations(a: &Station, b: &Station) -> Ordering {
    match (a.is_quick_mix, b.is_quick_mix) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a
            .name
            .to_ascii_lowercase()
            .cmp(&b.name.to_ascii_lowercase()),
    }
}

/// Cut `text` to `columns` display columns, ending in "…" when shortened.
pub fn ellipsize(text: &str, columns: usize) -> String {
    let total: usize = text.chars().map(|c| c.width().unwrap_or(0)).sum();
    if total <= columns {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > columns {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}

pub struct StationsPopover {
    pub list: ScrollableList<Station>,
    search: FilterInput,
    pub sorted: bool,
}

impl StationsPopover {
    pub fn new() -> Self {
        Self {
            list: ScrollableList::new(station_matches),
            search: FilterInput::new("⌕", "search stations"),
            sorted: false,
        }
    }

    /// Take the station list from the player, keeping insertion order.
    pub fn sync_stations(&mut self, stations: &[Station]) {
        self.list.set_items(stations.to_vec());
        self.apply_sort();
    }

    pub fn reset(&mut self, current: Option<&str>) {
        self.search.clear();
        self.list.set_filter("");
        self.apply_sort();
        self.list.select_first();
        if let Some(id) = current {
            self.list.select_where(|s| s.id == id);
        }
    }

    fn apply_sort(&mut self) {
        if self.sorted {
            self.list.sort_by(compare_stations);
        } else {
            self.list.refilter();
        }
    }

    pub fn toggle_sort(&mut self) {
        self.sorted = !self.sorted;
        self.apply_sort();
    }

    pub fn set_query(&mut self, query: &str) {
        self.list.set_filter(query);
        self.apply_sort();
    }

    /// Names in display order.
    pub fn visible_names(&self) -> Vec<&str> {
        self.list.shown().map(|s| s.name.as_str()).collect()
    }
}

impl Component for StationsPopover {
    fn id(&self) -> ComponentId {
        ComponentId::StationsPopover
    }

    fn handle_key(&mut self, key: KeyEvent, _state: &AppState) -> Vec<Action> {
        match key.code {
            KeyCode::Up => self.list.select_up(1),
            KeyCode::Down => self.list.select_down(1),
            KeyCode::PageUp => self.list.select_up(10),
            KeyCode::PageDown => self.list.select_down(10),
            KeyCode::Tab => self.toggle_sort(),
            _ => match self.search.handle_key(key) {
                InputAction::Changed(text) => self.set_query(&text),
                InputAction::Confirmed => {
                    if let Some(station) = self.list.selected_item() {
                        return vec![Action::PlayStation(station.id.clone()), Action::CloseOverlay];
                    }
                }
                InputAction::Cancelled => return vec![Action::CloseOverlay],
                InputAction::None => {}
            },
        }
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, _focused: bool, state: &AppState) {
        let height = (self.list.items.len() as u16 + 4).clamp(6, 20);
        let popup = centered(area, 34, height);
        let inner = dialog_frame(frame, popup, "stations");
        if inner.height < 2 {
            return;
        }

        let sort_label = if self.sorted { "A-Z" } else { "—" };
        let search_area = Rect {
            width: inner.width.saturating_sub(4),
            height: 1,
            ..inner
        };
        self.search.draw(frame, search_area, true);
        frame.render_widget(
            Paragraph::new(Span::styled(
                format!(" {}", sort_label),
                Style::default().fg(if self.sorted { C_PRIMARY } else { C_MUTED }),
            )),
            Rect {
                x: search_area.x + search_area.width,
                width: 4.min(inner.width),
                height: 1,
                ..inner
            },
        );

        let list_area = Rect {
            y: inner.y + 1,
            height: inner.height - 1,
            ..inner
        };
        let rows = list_area.height as usize;
        if self.list.is_empty() {
            frame.render_widget(
                Paragraph::new(Span::styled("  no stations match", Style::default().fg(C_MUTED))),
                list_area,
            );
            return;
        }
        self.list.ensure_visible(rows);
        let selected = self.list.selected_in_view(rows);
        let playing = state.player.current_station.as_deref();
        let lines: Vec<Line> = self
            .list
            .visible_items(rows)
            .enumerate()
            .map(|(row, station)| {
                let name_style = if row == selected {
                    style_selected_focused()
                } else if Some(station.id.as_str()) == playing {
                    Style::default().fg(C_PLAYING)
                } else {
                    Style::default().fg(C_PRIMARY)
                };
                let name = ellipsize(&station.name, NAME_COLUMNS);
                let mut spans = vec![Span::styled(
                    format!(" {:<width$}", name, width = NAME_COLUMNS),
                    name_style,
                )];
                if !station.is_quick_mix {
                    let mark = if station.use_quick_mix { "[x]" } else { "[ ]" };
                    spans.push(Span::styled(format!("  {}", mark), Style::default().fg(C_SECONDARY)));
                }
                Line::from(spans)
            })
            .collect();
        frame.render_widget(Paragraph::new(lines), list_area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radiola_core::state::with_quick_mix;
    use ratatui::crossterm::event::KeyModifiers;

    fn stations() -> Vec<Station> {
        with_quick_mix(vec![
            Station::new("drone Zone", "http://a/"),
            Station::new("Groove Salad", "http://b/"),
            Station::new("beat Blender", "http://c/"),
        ])
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn filter_is_case_insensitive_substring() {
        let s = Station::new("Groove Salad", "http://b/");
        assert!(station_matches(&s, "salad"));
        assert!(station_matches(&s, "OVE S"));
        assert!(station_matches(&s, ""));
        assert!(!station_matches(&s, "drone"));
    }

    #[test]
    fn sorting_puts_quick_mix_first_then_names() {
        let mut popover = StationsPopover::new();
        popover.sync_stations(&stations());
        assert_eq!(
            popover.visible_names(),
            vec!["QuickMix", "drone Zone", "Groove Salad", "beat Blender"]
        );
        popover.toggle_sort();
        assert_eq!(
            popover.visible_names(),
            vec!["QuickMix", "beat Blender", "drone Zone", "Groove Salad"]
        );
        popover.set_query("e");
        assert_eq!(
            popover.visible_names(),
            vec!["beat Blender", "drone Zone", "Groove Salad"]
        );
        popover.toggle_sort();
        assert_eq!(
            popover.visible_names(),
            vec!["drone Zone", "Groove Salad", "beat Blender"]
        );
    }

    #[test]
    fn inserted_stations_show_up() {
        let mut popover = StationsPopover::new();
        let mut list = stations();
        popover.sync_stations(&list);
        list.push(Station::new("Lush", "http://d/"));
        popover.sync_stations(&list);
        assert_eq!(popover.visible_names().last(), Some(&"Lush"));
    }

    #[test]
    fn names_are_cut_to_fifteen_columns() {
        assert_eq!(ellipsize("Groove Salad", 15), "Groove Salad");
        assert_eq!(ellipsize("SomaFM Indie Pop Rocks!", 15), "SomaFM Indie P…");
        assert_eq!(ellipsize("SomaFM Indie Pop Rocks!", 15).chars().count(), 15);
    }

    #[test]
    fn enter_plays_selection_and_esc_closes() {
        let state = AppState::default();
        let mut popover = StationsPopover::new();
        popover.sync_stations(&stations());
        popover.reset(None);
        for c in "groove".chars() {
            popover.handle_key(key(KeyCode::Char(c)), &state);
        }
        let groove = stations()[2].id.clone();
        assert_eq!(
            popover.handle_key(key(KeyCode::Enter), &state),
            vec![Action::PlayStation(groove), Action::CloseOverlay]
        );
        assert!(popover.handle_key(key(KeyCode::Esc), &state).is_empty());
        assert_eq!(
            popover.handle_key(key(KeyCode::Esc), &state),
            vec![Action::CloseOverlay]
        );
    }
}
