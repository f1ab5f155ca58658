use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Summary shown for events the calendar returns without a title.
pub const NO_TITLE_PLACEHOLDER: &str = "(No title)";

/// One side of an event's time range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTime {
    /// Timed value, already resolved into the calendar's zone.
    Instant(DateTime<Tz>),
    /// Civil date of an all-day event.
    Date(NaiveDate),
    /// Raw text that could not be parsed as either form.
    Unparsable(String),
}

impl EventTime {
    pub fn as_instant(&self) -> Option<&DateTime<Tz>> {
        match self {
            Self::Instant(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_unparsable(&self) -> bool {
        matches!(self, Self::Unparsable(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub summary: String,
    pub start: EventTime,
    pub end: EventTime,
    pub location: String,
    pub all_day: bool,
}

impl Event {
    pub fn is_parsable(&self) -> bool {
        !self.start.is_unparsable() && !self.end.is_unparsable()
    }

    /// Start and end instants of a timed, fully parsed event.
    pub fn timed_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        if self.all_day {
            return None;
        }
        let start = self.start.as_instant()?;
        let end = self.end.as_instant()?;
        Some((start.with_timezone(&Utc), end.with_timezone(&Utc)))
    }

    /// Deduplication key for alerts: start instant followed by the summary.
    pub fn alert_key(&self) -> Option<String> {
        let start = self.start.as_instant()?;
        Some(format!("{}{}", start.to_rfc3339(), self.summary))
    }
}

/// Snapshot of one successful fetch. Replaced wholesale, never edited.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSet {
    pub events: Vec<Event>,
    pub timezone: Tz,
    pub date: NaiveDate,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    None,
    NoEvents,
    AllPast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeDay {
    Today,
    Yesterday,
    Tomorrow,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleEvent {
    pub event: Event,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewModel {
    pub selected_date: NaiveDate,
    pub relative_day: RelativeDay,
    pub visible_events: Vec<VisibleEvent>,
    pub empty_reason: EmptyReason,
    pub error: Option<String>,
    pub login_required: bool,
    pub loading: bool,
    pub alerts_enabled: bool,
}

impl ViewModel {
    /// Placeholder while the events of `selected_date` have not arrived yet.
    pub fn loading(selected_date: NaiveDate, relative_day: RelativeDay) -> Self {
        Self {
            selected_date,
            relative_day,
            visible_events: Vec::new(),
            empty_reason: EmptyReason::None,
            error: None,
            login_required: false,
            loading: true,
            alerts_enabled: false,
        }
    }

    /// Whole-view error projection; no partial event list is kept.
    pub fn error(
        selected_date: NaiveDate,
        relative_day: RelativeDay,
        message: impl Into<String>,
        login_required: bool,
    ) -> Self {
        Self {
            selected_date,
            relative_day,
            visible_events: Vec::new(),
            empty_reason: EmptyReason::None,
            error: Some(message.into()),
            login_required,
            loading: false,
            alerts_enabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertFired {
    pub event: Event,
    pub minutes_remaining: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        if self.access_token.trim().is_empty() {
            return false;
        }
        self.expires_at
            .map(|expires_at| expires_at > now + chrono::Duration::seconds(leeway_seconds))
            .unwrap_or(true)
    }
}
