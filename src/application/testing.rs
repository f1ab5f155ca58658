//! Fakes shared by the application-layer tests.

use crate::application::ports::{AuthProvider, CalendarSource, DisplaySink, Notifier, RawEventList};
use crate::domain::models::{AlertFired, ViewModel};
use crate::domain::time_source::TimeSource;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{CalendarEventDateTime, RawCalendarEvent};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

type FetchResult = Result<RawEventList, InfraError>;

pub fn raw_timed(summary: &str, start: &str, end: &str) -> RawCalendarEvent {
    RawCalendarEvent {
        summary: Some(summary.to_string()),
        location: None,
        start: CalendarEventDateTime::timed(start),
        end: CalendarEventDateTime::timed(end),
    }
}

pub fn instant(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .expect("valid datetime")
        .with_timezone(&Utc)
}

/// Calendar source whose responses are released by the test, per date.
/// Dates without a registered gate answer immediately with an empty day.
#[derive(Debug, Default)]
pub struct GatedCalendarSource {
    gates: Mutex<HashMap<NaiveDate, VecDeque<oneshot::Receiver<FetchResult>>>>,
    calls: Mutex<Vec<(NaiveDate, Option<Tz>)>>,
}

impl GatedCalendarSource {
    pub fn gate(&self, date: NaiveDate) -> oneshot::Sender<FetchResult> {
        let (tx, rx) = oneshot::channel();
        self.gates
            .lock()
            .expect("gate lock poisoned")
            .entry(date)
            .or_default()
            .push_back(rx);
        tx
    }

    pub fn calls(&self) -> Vec<(NaiveDate, Option<Tz>)> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }
}

#[async_trait]
impl CalendarSource for GatedCalendarSource {
    async fn fetch_events(&self, date: NaiveDate, zone: Option<Tz>) -> FetchResult {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push((date, zone));
        let gate = self
            .gates
            .lock()
            .expect("gate lock poisoned")
            .get_mut(&date)
            .and_then(VecDeque::pop_front);

        match gate {
            Some(gate) => gate
                .await
                .unwrap_or_else(|_| Err(InfraError::FetchFailed("gate dropped".to_string()))),
            None => Ok(RawEventList::default()),
        }
    }
}

#[derive(Debug)]
pub struct FakeAuth {
    logged_in: AtomicBool,
    login_fails: AtomicBool,
}

impl FakeAuth {
    pub fn logged_in() -> Self {
        Self {
            logged_in: AtomicBool::new(true),
            login_fails: AtomicBool::new(false),
        }
    }

    pub fn logged_out() -> Self {
        Self {
            logged_in: AtomicBool::new(false),
            login_fails: AtomicBool::new(false),
        }
    }

    pub fn fail_logins(&self) {
        self.login_fails.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn access_token(&self) -> Result<String, InfraError> {
        if self.is_logged_in() {
            Ok("fake-token".to_string())
        } else {
            Err(InfraError::AuthMissing)
        }
    }

    async fn login(&self) -> Result<(), InfraError> {
        if self.login_fails.load(Ordering::SeqCst) {
            return Err(InfraError::AuthMissing);
        }
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn logout(&self) {
        self.logged_in.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct RecordingDisplay {
    views: Mutex<Vec<ViewModel>>,
}

impl RecordingDisplay {
    pub fn views(&self) -> Vec<ViewModel> {
        self.views.lock().expect("views lock poisoned").clone()
    }

    pub fn last(&self) -> ViewModel {
        self.views()
            .pop()
            .expect("at least one view model was published")
    }
}

impl DisplaySink for RecordingDisplay {
    fn on_view_model_changed(&self, view: &ViewModel) {
        self.views
            .lock()
            .expect("views lock poisoned")
            .push(view.clone());
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<AlertFired>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<AlertFired> {
        self.alerts.lock().expect("alerts lock poisoned").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn on_alert_fired(&self, alert: &AlertFired) {
        self.alerts
            .lock()
            .expect("alerts lock poisoned")
            .push(alert.clone());
    }
}

/// Clock the test moves by hand.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock lock poisoned") = now;
    }

    pub fn time_source(&self) -> TimeSource {
        let now = Arc::clone(&self.now);
        TimeSource::from_provider(Arc::new(move || *now.lock().expect("clock lock poisoned")))
    }
}
