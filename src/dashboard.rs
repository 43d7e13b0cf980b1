use std::io::{self, Stdout, Write};

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, queue, ExecutableCommand};

use crate::panel::{PanelField, PanelState, SaveFeedback, SettingsPanel};
use crate::types::{AlertEvent, AlertState, SystemSettings, SystemStatus};

/// Poll results older than this are flagged as stale in the health panel.
const STALE_AFTER_MS: i64 = 5000;
const EVENT_ROWS: usize = 8;

/// Everything the renderer needs. Mutated only by the main loop; the
/// renderer is a pure projection of this struct onto the terminal.
pub struct ViewState {
    pub status: SystemStatus,
    pub events: Vec<AlertEvent>,
    pub archived_total: u64,
    pub settings: SystemSettings,
    pub detecting: bool,
    pub camera_error: Option<String>,
    pub show_settings: bool,
}

/// Raw-mode terminal session. Dropping it restores the terminal, so every
/// exit path tears down cleanly.
pub struct Screen {
    out: Stdout,
}

impl Screen {
    pub fn enter() -> Result<Self> {
        let mut out = io::stdout();
        terminal::enable_raw_mode()?;
        out.execute(EnterAlternateScreen)?;
        out.execute(cursor::Hide)?;
        Ok(Screen { out })
    }

    pub fn draw(&mut self, view: &ViewState, panel: &SettingsPanel) -> Result<()> {
        let out = &mut self.out;
        queue!(out, Clear(ClearType::All), cursor::MoveTo(0, 0))?;

        let mut row: u16 = 0;
        let mut line = |out: &mut Stdout, color: Option<Color>, bold: bool, text: String| -> Result<()> {
            queue!(out, cursor::MoveTo(0, row))?;
            if bold {
                queue!(out, SetAttribute(Attribute::Bold))?;
            }
            if let Some(c) = color {
                queue!(out, SetForegroundColor(c))?;
            }
            queue!(out, Print(text), ResetColor, SetAttribute(Attribute::Reset))?;
            row += 1;
            Ok(())
        };

        let detecting = if view.detecting {
            "detection ON"
        } else {
            "detection off"
        };
        line(
            out,
            None,
            true,
            format!("Driver Drowsiness Monitor            [{}]", detecting),
        )?;
        line(out, Some(Color::DarkGrey), false, "─".repeat(64))?;

        let alert_color = state_color(view.status.alert_state);
        line(
            out,
            Some(alert_color),
            false,
            format!(
                "  EAR {}   (threshold {:.2})",
                format_ear(view.status.current_ear),
                view.settings.ear_threshold
            ),
        )?;
        line(
            out,
            Some(alert_color),
            true,
            format!(
                "  Alert: {}  {}",
                view.status.alert_state.label(),
                if view.status.alert_state == AlertState::Normal {
                    "· driver alert"
                } else {
                    "· attention required"
                }
            ),
        )?;
        line(
            out,
            None,
            false,
            format!(
                "  Recent alerts: {}   (archived: {})",
                view.events.len(),
                view.archived_total
            ),
        )?;
        line(out, None, false, String::new())?;

        // Health indicators, browser dashboard's SystemHealth card.
        let age_ms = (Utc::now() - view.status.last_update).num_milliseconds();
        let fresh = age_ms < STALE_AFTER_MS;
        line(
            out,
            None,
            false,
            format!(
                "  Camera {}   Telegram {}   Updated {}{}",
                check(view.status.camera_active),
                check(view.status.telegram_connected),
                format_relative(view.status.last_update),
                if fresh { "" } else { "  [stale]" }
            ),
        )?;
        match &view.camera_error {
            Some(err) => line(out, Some(Color::Red), false, format!("  Capture: {}", err))?,
            None if view.detecting => {
                line(out, Some(Color::Green), false, "  Capture: streaming frames".to_string())?
            }
            None => line(out, Some(Color::DarkGrey), false, "  Capture: idle".to_string())?,
        }
        line(out, None, false, String::new())?;

        line(out, None, true, "  Event log".to_string())?;
        if view.events.is_empty() {
            line(out, Some(Color::DarkGrey), false, "    no events recorded".to_string())?;
        } else {
            for event in view.events.iter().take(EVENT_ROWS) {
                line(
                    out,
                    Some(state_color(event.alert_type)),
                    false,
                    format!(
                        "    ● {:<8} EAR {}  {}",
                        event.alert_type.as_str(),
                        format_ear(event.ear_value),
                        format_event_time(&event.timestamp)
                    ),
                )?;
            }
        }
        line(out, None, false, String::new())?;

        if view.show_settings {
            draw_settings(out, &mut line, panel)?;
        }

        line(
            out,
            Some(Color::DarkGrey),
            false,
            "  q quit · d toggle detection · s settings · ↑↓ select · ←→ adjust · enter save"
                .to_string(),
        )?;

        out.flush()?;
        Ok(())
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        let _ = self.out.execute(cursor::Show);
        let _ = self.out.execute(LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

fn draw_settings(
    out: &mut Stdout,
    line: &mut impl FnMut(&mut Stdout, Option<Color>, bool, String) -> Result<()>,
    panel: &SettingsPanel,
) -> Result<()> {
    line(out, None, true, "  Settings".to_string())?;
    let s = panel.working();
    let rows = [
        (
            PanelField::EarThreshold,
            format!("EAR threshold          {:.2}", s.ear_threshold),
        ),
        (
            PanelField::AlertDuration,
            format!("Alert duration         {} s", s.alert_duration_threshold),
        ),
        (
            PanelField::NotificationCooldown,
            format!("Notification cooldown  {} s", s.notification_cooldown),
        ),
        (
            PanelField::TelegramEnabled,
            format!(
                "Telegram notifications {}",
                if s.telegram_enabled { "on" } else { "off" }
            ),
        ),
    ];
    for (field, text) in rows {
        let marker = if panel.selected() == field { ">" } else { " " };
        let color = (panel.selected() == field).then_some(Color::Cyan);
        line(out, color, false, format!("   {} {}", marker, text))?;
    }

    let (color, note) = match (panel.state(), panel.last_save()) {
        (PanelState::Saving, _) => (Color::Yellow, "saving…"),
        (PanelState::Dirty, _) => (Color::Yellow, "unsaved changes · enter to save"),
        (_, Some(SaveFeedback::Acked)) => (Color::Green, "saved"),
        (_, Some(SaveFeedback::LocalOnly)) => (Color::Yellow, "saved locally · backend unreachable"),
        _ => (Color::DarkGrey, "no pending changes"),
    };
    line(out, Some(color), false, format!("    [{}]", note))?;
    line(out, None, false, String::new())?;
    Ok(())
}

fn state_color(state: AlertState) -> Color {
    match state {
        AlertState::Normal => Color::Green,
        AlertState::Warning => Color::Yellow,
        AlertState::Critical => Color::Red,
    }
}

fn check(ok: bool) -> &'static str {
    if ok {
        "✓"
    } else {
        "✗"
    }
}

pub fn format_ear(value: f64) -> String {
    format!("{:.3}", value)
}

/// Relative age of a timestamp, falling back to a full local time for
/// anything older than a day.
pub fn format_relative(then: DateTime<Utc>) -> String {
    let diff = Utc::now() - then;
    let secs = diff.num_seconds().max(0);
    if secs < 60 {
        return format!("{}s ago", secs);
    }
    let mins = secs / 60;
    if mins < 60 {
        return format!("{}m ago", mins);
    }
    let hours = mins / 60;
    if hours < 24 {
        return format!("{}h ago", hours);
    }
    then.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Backend event timestamps are passed through as strings; render them
/// relatively when they parse as RFC 3339, verbatim otherwise.
pub fn format_event_time(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => format_relative(parsed.with_timezone(&Utc)),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn ear_renders_three_decimals() {
        assert_eq!(format_ear(0.2), "0.200");
        assert_eq!(format_ear(0.2746), "0.275");
    }

    #[test]
    fn relative_times_scale_with_age() {
        assert_eq!(format_relative(Utc::now() - Duration::seconds(30)), "30s ago");
        assert_eq!(format_relative(Utc::now() - Duration::minutes(5)), "5m ago");
        assert_eq!(format_relative(Utc::now() - Duration::hours(3)), "3h ago");
    }

    #[test]
    fn future_timestamps_clamp_to_zero() {
        assert_eq!(format_relative(Utc::now() + Duration::seconds(10)), "0s ago");
    }

    #[test]
    fn unparseable_event_times_pass_through() {
        assert_eq!(format_event_time("just now"), "just now");
    }

    #[test]
    fn rfc3339_event_times_render_relatively() {
        let raw = (Utc::now() - Duration::seconds(45)).to_rfc3339();
        assert_eq!(format_event_time(&raw), "45s ago");
    }
}
