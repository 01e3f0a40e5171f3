//! Colors and styles for the player window.

use ratatui::style::{Color, Modifier, Style};

pub const C_BG: Color = Color::Rgb(16, 16, 20);
pub const C_ACCENT: Color = Color::Rgb(240, 110, 70);
pub const C_PRIMARY: Color = Color::Rgb(220, 216, 208);
pub const C_SECONDARY: Color = Color::Rgb(128, 124, 140);
pub const C_MUTED: Color = Color::Rgb(76, 74, 90);
pub const C_SEPARATOR: Color = Color::Rgb(42, 40, 52);

// playback state
pub const C_PLAYING: Color = Color::Rgb(110, 200, 130);
pub const C_CONNECTING: Color = Color::Rgb(250, 190, 90);
pub const C_ERROR: Color = Color::Rgb(240, 85, 85);

// ratings
pub const C_LOVE: Color = Color::Rgb(245, 125, 175);
pub const C_BAN: Color = Color::Rgb(150, 95, 95);

// station details
pub const C_TAG: Color = Color::Rgb(100, 150, 210);
pub const C_LOCATION: Color = Color::Rgb(120, 170, 140);

pub const C_SELECTION_BG: Color = Color::Rgb(34, 32, 46);
pub const C_PANEL_BORDER: Color = Color::Rgb(46, 44, 58);
pub const C_PANEL_BORDER_FOCUSED: Color = Color::Rgb(240, 110, 70);
pub const C_FILTER_BG: Color = Color::Rgb(24, 22, 32);
pub const C_FILTER_FG: Color = Color::Rgb(250, 200, 100);

pub const C_TOAST_INFO: Color = Color::Rgb(100, 160, 220);
pub const C_TOAST_SUCCESS: Color = Color::Rgb(110, 200, 130);
pub const C_TOAST_WARNING: Color = Color::Rgb(250, 190, 90);
pub const C_TOAST_ERROR: Color = Color::Rgb(240, 85, 85);

pub const C_MODE_NORMAL: Color = Color::Rgb(128, 124, 140);
pub const C_MODE_DIALOG: Color = Color::Rgb(250, 200, 100);

/// Highlighted row in a list or dialog.
pub fn style_selected_focused() -> Style {
    Style::default()
        .bg(C_SELECTION_BG)
        .fg(C_PRIMARY)
        .add_modifier(Modifier::BOLD)
}

pub fn style_focused_border() -> Style {
    Style::default().fg(C_PANEL_BORDER_FOCUSED)
}

pub fn style_unfocused_border() -> Style {
    Style::default().fg(C_PANEL_BORDER)
}
