//! HelpOverlay: keyboard shortcut reference.

use ratatui::crossterm::event::KeyEvent;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Wrap},
    Frame,
};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{C_MUTED, C_PRIMARY, C_SECONDARY},
    widgets::pane_chrome::{centered, dialog_frame},
};

pub struct HelpOverlay;

impl HelpOverlay {
    pub fn new() -> Self {
        Self
    }
}

impl Component for HelpOverlay {
    fn id(&self) -> ComponentId {
        ComponentId::HelpOverlay
    }

    /// Any key closes the overlay.
    fn handle_key(&mut self, _key: KeyEvent, _state: &AppState) -> Vec<Action> {
        vec![Action::CloseOverlay]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, _focused: bool, _state: &AppState) {
        let popup = centered(area, 60, 26);
        let inner = dialog_frame(frame, popup, "keyboard shortcuts");

        let lines = vec![
            section("playback"),
            help_row("space", "play / pause"),
            help_row("n", "next song"),
            help_row("← / →", "volume down / up"),
            help_row("l / b / t / u", "love / ban / tired / unrate"),
            Line::from(""),
            section("stations"),
            help_row("s", "stations (type to filter, tab sorts)"),
            help_row("f", "search the station directory"),
            Line::from(""),
            section("window"),
            help_row("↑ / ↓  or  j / k", "move in the history"),
            help_row("enter", "copy the selected song"),
            help_row("y", "copy \"artist - title\""),
            help_row("p", "plugins"),
            help_row("L", "toggle log panel"),
            help_row("?", "this help"),
            help_row("q", "close (hides when a plugin asks)"),
            help_row("Q / Ctrl+C", "quit"),
            Line::from(""),
            Line::from(Span::styled(" press any key to close", Style::default().fg(C_MUTED))),
        ];
        frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
    }
}

fn section(title: &str) -> Line<'_> {
    Line::from(Span::styled(
        format!(" {}", title),
        Style::default().fg(C_MUTED).add_modifier(Modifier::BOLD),
    ))
}

fn help_row<'a>(key: &'a str, desc: &'a str) -> Line<'a> {
    Line::from(vec![
        Span::raw(" "),
        Span::styled(
            format!("{:<18}", key),
            Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD),
        ),
        Span::styled(desc, Style::default().fg(C_SECONDARY)),
    ])
}
