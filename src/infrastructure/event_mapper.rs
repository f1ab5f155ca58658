use crate::domain::models::{Event, EventTime, NO_TITLE_PLACEHOLDER};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use tracing::warn;

const DATE_FORMAT: &str = "%Y-%m-%d";
const LOCAL_DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventDateTime {
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl CalendarEventDateTime {
    pub fn timed(value: impl Into<String>) -> Self {
        Self {
            date_time: Some(value.into()),
            date: None,
        }
    }

    pub fn all_day(value: impl Into<String>) -> Self {
        Self {
            date_time: None,
            date: Some(value.into()),
        }
    }

    /// The populated representation, preferring `dateTime` over `date`.
    fn raw(&self) -> Option<&str> {
        self.date_time
            .as_deref()
            .or(self.date.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Event record as the calendar API returns it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RawCalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub start: CalendarEventDateTime,
    #[serde(default)]
    pub end: CalendarEventDateTime,
}

/// Converts one raw record into the canonical model. Never fails: bad time
/// fields end up as [`EventTime::Unparsable`].
pub fn normalize_event(raw: &RawCalendarEvent, zone: Tz) -> Event {
    let summary = raw
        .summary
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(NO_TITLE_PLACEHOLDER)
        .to_string();
    let location = raw
        .location
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    let start_is_date = raw.start.raw().and_then(parse_date).is_some();
    let (start, end) = if start_is_date {
        (
            date_side(raw.start.raw(), "start", zone),
            date_side(raw.end.raw(), "end", zone),
        )
    } else {
        (
            instant_side(raw.start.raw(), "start", zone),
            instant_side(raw.end.raw(), "end", zone),
        )
    };
    let all_day = matches!((&start, &end), (EventTime::Date(_), EventTime::Date(_)));

    Event {
        summary,
        start,
        end,
        location,
        all_day,
    }
}

/// Normalizes a whole response in source order, logging malformed entries.
pub fn normalize_events(raw_events: &[RawCalendarEvent], zone: Tz) -> Vec<Event> {
    raw_events
        .iter()
        .map(|raw| {
            let event = normalize_event(raw, zone);
            if !event.is_parsable() {
                warn!(
                    summary = event.summary.as_str(),
                    start = ?event.start,
                    end = ?event.end,
                    "calendar event has unparsable time fields"
                );
            }
            event
        })
        .collect()
}

fn date_side(raw: Option<&str>, field_name: &str, zone: Tz) -> EventTime {
    let Some(value) = raw else {
        return EventTime::Unparsable(String::new());
    };
    if let Some(date) = parse_date(value) {
        return EventTime::Date(date);
    }
    match parse_instant(value, field_name, zone) {
        Ok(instant) => EventTime::Date(instant.date_naive()),
        Err(_) => EventTime::Unparsable(value.to_string()),
    }
}

fn instant_side(raw: Option<&str>, field_name: &str, zone: Tz) -> EventTime {
    let Some(value) = raw else {
        return EventTime::Unparsable(String::new());
    };
    match parse_instant(value, field_name, zone) {
        Ok(instant) => EventTime::Instant(instant),
        Err(_) => EventTime::Unparsable(value.to_string()),
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

/// Offset-bearing values are converted into `zone`; bare local times are
/// read as wall-clock time in `zone`.
pub fn parse_instant(value: &str, field_name: &str, zone: Tz) -> Result<DateTime<Tz>, InfraError> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&zone));
    }

    let naive = NaiveDateTime::parse_from_str(value, LOCAL_DATE_TIME_FORMAT).map_err(|error| {
        InfraError::ParseFailed(format!("invalid event {field_name} '{value}': {error}"))
    })?;
    zone.from_local_datetime(&naive).earliest().ok_or_else(|| {
        InfraError::ParseFailed(format!(
            "event {field_name} '{value}' does not exist in {zone}"
        ))
    })
}
