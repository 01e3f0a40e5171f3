//! NowPlaying: station, song and playback state.
//!
//! Not focusable; global keys drive it through the App.

use ratatui::crossterm::event::KeyEvent;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use radiola_core::protocol::{PlaybackStatus, Song};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{
        C_BAN, C_CONNECTING, C_ERROR, C_LOCATION, C_LOVE, C_MUTED, C_PLAYING, C_PRIMARY,
        C_SECONDARY, C_TAG,
    },
    widgets::pane_chrome::{pane_chrome, Badge},
};

pub struct NowPlaying;

impl NowPlaying {
    pub fn new() -> Self {
        Self
    }
}

fn status_badge(status: PlaybackStatus) -> Option<Badge<'static>> {
    match status {
        PlaybackStatus::Playing => Some(Badge {
            text: "LIVE",
            color: C_PLAYING,
        }),
        PlaybackStatus::Connecting => Some(Badge {
            text: "…",
            color: C_CONNECTING,
        }),
        PlaybackStatus::Paused => Some(Badge {
            text: "PAUSED",
            color: C_SECONDARY,
        }),
        PlaybackStatus::Error => Some(Badge {
            text: "ERR",
            color: C_ERROR,
        }),
        PlaybackStatus::Idle => None,
    }
}

/// Rating markers shown after the title.
pub fn rating_marks(song: &Song) -> Vec<Span<'static>> {
    let mut marks = Vec::new();
    if song.is_loved() {
        marks.push(Span::styled(" ♥", Style::default().fg(C_LOVE)));
    }
    if song.is_banned() {
        marks.push(Span::styled(" ✗", Style::default().fg(C_BAN)));
    }
    if song.tired {
        marks.push(Span::styled(" z", Style::default().fg(C_MUTED)));
    }
    marks
}

/// Volume bar of `width` cells.
pub fn volume_bar(volume: f64, width: usize) -> String {
    let filled = ((volume.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    format!("{}{}", "█".repeat(filled), "·".repeat(width - filled))
}

pub fn fmt_clock(v: f64) -> String {
    let total = v.max(0.0).round() as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{:02}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

impl Component for NowPlaying {
    fn id(&self) -> ComponentId {
        ComponentId::NowPlaying
    }

    fn handle_key(&mut self, _key: KeyEvent, _state: &AppState) -> Vec<Action> {
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        let block = pane_chrome("now playing", focused, status_badge(state.player.playback_status));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let mut lines = Vec::new();
        let station_line = match (state.current_station(), state.playing_station()) {
            (Some(current), Some(playing)) if current.is_quick_mix => Line::from(vec![
                Span::styled(format!(" {}", current.name), Style::default().fg(C_SECONDARY)),
                Span::styled(" → ", Style::default().fg(C_MUTED)),
                Span::styled(playing.name.clone(), Style::default().fg(C_PRIMARY)),
            ]),
            (Some(current), _) => {
                let mut spans = vec![Span::styled(
                    format!(" {}", current.name),
                    Style::default().fg(C_PRIMARY),
                )];
                if !current.country.is_empty() {
                    spans.push(Span::styled(
                        format!("  {}", current.country),
                        Style::default().fg(C_LOCATION),
                    ));
                }
                if !current.tags.is_empty() {
                    spans.push(Span::styled(
                        format!("  {}", current.tags.join(", ")),
                        Style::default().fg(C_TAG),
                    ));
                }
                Line::from(spans)
            }
            (None, _) => Line::from(Span::styled(" ■  nothing playing", Style::default().fg(C_MUTED))),
        };
        lines.push(station_line);
        lines.push(Line::raw(""));

        match state.current_song() {
            Some(song) => {
                let mut title = vec![Span::styled(
                    format!(" {}", song.title),
                    Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD),
                )];
                title.extend(rating_marks(song));
                lines.push(Line::from(title));
                if !song.artist.is_empty() {
                    lines.push(Line::from(vec![
                        Span::styled(" by ", Style::default().fg(C_MUTED)),
                        Span::styled(song.artist.clone(), Style::default().fg(C_SECONDARY)),
                    ]));
                }
                if !song.album.is_empty() {
                    lines.push(Line::from(vec![
                        Span::styled(" from ", Style::default().fg(C_MUTED)),
                        Span::styled(song.album.clone(), Style::default().fg(C_SECONDARY)),
                    ]));
                }
                if let Some(art) = &song.art_url {
                    lines.push(Line::from(Span::styled(
                        format!(" art {}", art),
                        Style::default().fg(C_MUTED),
                    )));
                }
            }
            None => lines.push(Line::from(Span::styled(
                " waiting for song info",
                Style::default().fg(C_MUTED),
            ))),
        }

        lines.push(Line::raw(""));
        let mut footer = vec![
            Span::styled(" vol ", Style::default().fg(C_MUTED)),
            Span::styled(volume_bar(state.player.volume, 10), Style::default().fg(C_SECONDARY)),
            Span::styled(
                format!(" {:>3}%", (state.player.volume * 100.0).round() as u32),
                Style::default().fg(C_SECONDARY),
            ),
        ];
        if let Some(pos) = state.player.time_pos_secs {
            footer.push(Span::styled(
                format!("   {}", fmt_clock(pos)),
                Style::default().fg(C_SECONDARY),
            ));
        }
        lines.push(Line::from(footer));

        frame.render_widget(Paragraph::new(lines), inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radiola_core::protocol::Rating;

    #[test]
    fn volume_bar_rounds_to_cells() {
        assert_eq!(volume_bar(0.0, 4), "····");
        assert_eq!(volume_bar(0.5, 4), "██··");
        assert_eq!(volume_bar(1.5, 4), "████");
    }

    #[test]
    fn clock_switches_to_hours() {
        assert_eq!(fmt_clock(65.0), "01:05");
        assert_eq!(fmt_clock(3725.0), "01:02:05");
        assert_eq!(fmt_clock(-3.0), "00:00");
    }

    #[test]
    fn marks_reflect_rating_and_tired() {
        let song = Song {
            rating: Some(Rating::Love),
            tired: true,
            ..Default::default()
        };
        let text: String = rating_marks(&song).iter().map(|s| s.content.to_string()).collect();
        assert_eq!(text, " ♥ z");
    }
}
