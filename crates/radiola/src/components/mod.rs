pub mod help_overlay;
pub mod history;
pub mod log_panel;
pub mod now_playing;
pub mod plugins_dialog;
pub mod preferences_dialog;
pub mod search_dialog;
pub mod stations_popover;
