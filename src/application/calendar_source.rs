use crate::application::ports::{AuthProvider, CalendarSource, RawEventList};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::google_calendar_client::{GoogleCalendarClient, ListEventsRequest, ListEventsResponse};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::time::{sleep, Duration as TokioDuration};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

/// Fetches one day of events from a Google calendar.
pub struct GoogleCalendarSource<C>
where
    C: GoogleCalendarClient,
{
    calendar_client: Arc<C>,
    auth: Arc<dyn AuthProvider>,
    calendar_id: String,
    retry_policy: RetryPolicy,
}

impl<C> GoogleCalendarSource<C>
where
    C: GoogleCalendarClient,
{
    pub fn new(calendar_client: Arc<C>, auth: Arc<dyn AuthProvider>, calendar_id: impl Into<String>) -> Self {
        Self {
            calendar_client,
            auth,
            calendar_id: calendar_id.into(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    async fn list_events_with_retry(
        &self,
        access_token: &str,
        request: ListEventsRequest,
    ) -> Result<ListEventsResponse, InfraError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            match self
                .calendar_client
                .list_events(access_token, &self.calendar_id, request)
                .await
            {
                Ok(response) => return Ok(response),
                Err(error) if should_retry(&error) && attempt + 1 < max_attempts => {
                    let delay = self
                        .retry_policy
                        .base_delay_ms
                        .saturating_mul(2u64.saturating_pow(attempt as u32));
                    warn!(%error, attempt = attempt + 1, delay_ms = delay, "retrying calendar fetch");
                    sleep(TokioDuration::from_millis(delay)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn should_retry(error: &InfraError) -> bool {
    match error {
        InfraError::FetchFailed(message) => {
            let message = message.to_ascii_lowercase();
            message.contains("network error")
                || message.contains("timeout")
                || message.contains("timed out")
                || message.contains("temporarily unavailable")
                || message.contains("connection reset")
                || message.contains("http 503")
        }
        _ => false,
    }
}

fn start_of_day<Z: TimeZone>(zone: &Z, date: NaiveDate) -> DateTime<Utc> {
    // Zones that skip midnight start the day at the first valid hour.
    (0..24)
        .filter_map(|hour| NaiveTime::from_hms_opt(hour, 0, 0))
        .find_map(|time| zone.from_local_datetime(&date.and_time(time)).earliest())
        .map(|start| start.with_timezone(&Utc))
        .unwrap_or_else(|| date.and_time(NaiveTime::MIN).and_utc())
}

/// `[00:00, next 00:00)` of `date`, in `zone` or the machine's zone.
pub fn day_window(date: NaiveDate, zone: Option<Tz>) -> ListEventsRequest {
    let next = date.succ_opt().unwrap_or(date);
    match zone {
        Some(zone) => ListEventsRequest {
            time_min: start_of_day(&zone, date),
            time_max: start_of_day(&zone, next),
        },
        None => ListEventsRequest {
            time_min: start_of_day(&Local, date),
            time_max: start_of_day(&Local, next),
        },
    }
}

#[async_trait]
impl<C> CalendarSource for GoogleCalendarSource<C>
where
    C: GoogleCalendarClient,
{
    async fn fetch_events(&self, date: NaiveDate, zone: Option<Tz>) -> Result<RawEventList, InfraError> {
        let access_token = self.auth.access_token()?;
        let request = day_window(date, zone);
        debug!(
            %date,
            time_min = %request.time_min,
            time_max = %request.time_max,
            "listing calendar events"
        );

        let response = self.list_events_with_retry(&access_token, request).await?;
        Ok(RawEventList {
            events: response.events,
            time_zone: response.time_zone,
        })
    }
}
