//! Collaborator seams of the engine.

use crate::domain::models::{AlertFired, ViewModel};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::RawCalendarEvent;
use async_trait::async_trait;
use chrono::NaiveDate;
use chrono_tz::Tz;

/// One day of raw events plus the zone the calendar declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEventList {
    pub events: Vec<RawCalendarEvent>,
    pub time_zone: Option<String>,
}

#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// `zone` is the last calendar zone the engine learned, `None` before
    /// the first successful fetch.
    async fn fetch_events(&self, date: NaiveDate, zone: Option<Tz>) -> Result<RawEventList, InfraError>;
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn is_logged_in(&self) -> bool;
    fn access_token(&self) -> Result<String, InfraError>;
    async fn login(&self) -> Result<(), InfraError>;
    fn logout(&self);
}

pub trait DisplaySink: Send + Sync {
    fn on_view_model_changed(&self, view: &ViewModel);
}

pub trait Notifier: Send + Sync {
    fn on_alert_fired(&self, alert: &AlertFired);
}
