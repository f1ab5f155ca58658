use crate::application::engine::{EngineCommand, EngineHandle};
use crate::application::ports::{DisplaySink, Notifier};
use crate::domain::models::{AlertFired, EmptyReason, Event, EventTime, RelativeDay, ViewModel};
use crate::infrastructure::error::InfraError;
use chrono::{Datelike, NaiveDate};
use std::io::Write;
use std::sync::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

pub const CALENDAR_WEB_BASE: &str = "https://calendar.google.com/calendar/r/day";

pub const COMMAND_HELP: &str =
    "commands: n next day, p previous day, t today, r refresh, a toggle alerts, login, logout, q quit";

pub fn calendar_web_url(date: NaiveDate) -> String {
    format!(
        "{CALENDAR_WEB_BASE}/{}/{}/{}",
        date.year(),
        date.month(),
        date.day()
    )
}

fn relative_prefix(relative_day: RelativeDay) -> Option<&'static str> {
    match relative_day {
        RelativeDay::Today => Some("Today"),
        RelativeDay::Yesterday => Some("Yesterday"),
        RelativeDay::Tomorrow => Some("Tomorrow"),
        RelativeDay::Other => None,
    }
}

pub fn date_header(date: NaiveDate, relative_day: RelativeDay) -> String {
    let date_str = date.format("%Y/%m/%d (%a)");
    match relative_prefix(relative_day) {
        Some(prefix) => format!("{prefix}  {date_str}"),
        None => date_str.to_string(),
    }
}

/// `None` for events whose times could not be read.
pub fn time_label(event: &Event) -> Option<String> {
    if event.all_day {
        return Some("All day".to_string());
    }
    match (&event.start, &event.end) {
        (EventTime::Instant(start), EventTime::Instant(end)) => Some(format!(
            "{} - {}",
            start.format("%H:%M"),
            end.format("%H:%M")
        )),
        _ => None,
    }
}

pub fn render_view(view: &ViewModel) -> String {
    let mut lines = Vec::new();
    let alerts = if view.alerts_enabled { "on" } else { "off" };
    lines.push(format!(
        "{}    [alerts {alerts}]",
        date_header(view.selected_date, view.relative_day)
    ));

    if view.login_required {
        lines.push("Signing in to Google is required to load calendar events.".to_string());
        lines.push("Type `login` to sign in.".to_string());
    } else if let Some(error) = &view.error {
        lines.push(format!("Could not load events: {error}"));
    } else if view.loading {
        lines.push("Loading...".to_string());
    } else if view.visible_events.is_empty() {
        let message = match view.empty_reason {
            EmptyReason::AllPast => "No remaining events",
            _ => "No events",
        };
        lines.push(message.to_string());
    } else {
        for visible in &view.visible_events {
            let marker = if visible.is_current { ">" } else { " " };
            let event = &visible.event;
            match time_label(event) {
                Some(label) => lines.push(format!("{marker} {label}  {}", event.summary)),
                None => lines.push(format!("{marker} {}", event.summary)),
            }
            if !event.location.is_empty() {
                lines.push(format!("    @ {}", event.location));
            }
        }
    }

    lines.push(format!("open: {}", calendar_web_url(view.selected_date)));
    lines.join("\n")
}

pub fn render_alert(alert: &AlertFired) -> String {
    let mut text = format!("!! {} min left: {}", alert.minutes_remaining, alert.event.summary);
    if let Some(label) = time_label(&alert.event) {
        text.push_str(&format!(" ({label})"));
    }
    text
}

/// Writes each new view to the terminal.
#[derive(Debug, Default)]
pub struct ConsoleDisplay {
    out: Mutex<()>,
}

impl DisplaySink for ConsoleDisplay {
    fn on_view_model_changed(&self, view: &ViewModel) {
        let Ok(_guard) = self.out.lock() else {
            return;
        };
        let mut stdout = std::io::stdout().lock();
        if let Err(error) = writeln!(stdout, "\n{}", render_view(view)) {
            warn!(%error, "failed writing view to stdout");
        }
    }
}

#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn on_alert_fired(&self, alert: &AlertFired) {
        // Terminal bell in place of a popup.
        let mut stdout = std::io::stdout().lock();
        if let Err(error) = writeln!(stdout, "\x07{}", render_alert(alert)) {
            warn!(%error, "failed writing alert to stdout");
        }
    }
}

pub fn parse_command(line: &str) -> Option<EngineCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "n" | "next" => Some(EngineCommand::NextDay),
        "p" | "prev" => Some(EngineCommand::PreviousDay),
        "t" | "today" => Some(EngineCommand::GoToday),
        "r" | "refresh" => Some(EngineCommand::Refresh),
        "a" | "alerts" => Some(EngineCommand::ToggleAlerts),
        "login" => Some(EngineCommand::Login),
        "logout" => Some(EngineCommand::Logout),
        "q" | "quit" => Some(EngineCommand::Shutdown),
        _ => None,
    }
}

/// Forwards typed commands to the engine until `q` or end of input.
pub async fn run_command_loop<R>(reader: R, handle: &EngineHandle) -> Result<(), InfraError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Some(command) = parse_command(&line) else {
            println!("{COMMAND_HELP}");
            continue;
        };
        handle.send(command)?;
        if command == EngineCommand::Shutdown {
            return Ok(());
        }
    }

    info!("input closed; shutting down");
    handle.shutdown()
}
