use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::RawCalendarEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use url::Url;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEventsRequest {
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListEventsResponse {
    pub events: Vec<RawCalendarEvent>,
    /// The calendar's own zone, as declared on the first page.
    pub time_zone: Option<String>,
}

#[async_trait]
pub trait GoogleCalendarClient: Send + Sync {
    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        request: ListEventsRequest,
    ) -> Result<ListEventsResponse, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestGoogleCalendarClient {
    client: Client,
}

impl ReqwestGoogleCalendarClient {
    pub fn with_timeout(timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::builder().timeout(timeout).build().map_err(|error| {
            InfraError::InvalidConfig(format!("failed building http client: {error}"))
        })?;
        Ok(Self { client })
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::FetchFailed(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return InfraError::AuthMissing;
        }
        let message = if body.trim().is_empty() {
            format!("google calendar api error: http {}", status.as_u16())
        } else {
            format!("google calendar api error: http {}; body={body}", status.as_u16())
        };
        InfraError::FetchFailed(message)
    }

    fn events_endpoint(calendar_id: &str) -> Result<Url, InfraError> {
        let mut url = Url::parse(CALENDAR_API_BASE).map_err(|error| {
            InfraError::FetchFailed(format!("invalid calendar api base url: {error}"))
        })?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::FetchFailed("calendar api base URL cannot be a base".to_string())
            })?;
            segments.push("calendars");
            segments.push(calendar_id);
            segments.push("events");
        }
        Ok(url)
    }
}

#[derive(Debug, serde::Deserialize)]
struct EventsPageResponse {
    items: Option<Vec<RawCalendarEvent>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
    #[serde(rename = "timeZone")]
    time_zone: Option<String>,
}

#[async_trait]
impl GoogleCalendarClient for ReqwestGoogleCalendarClient {
    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        request: ListEventsRequest,
    ) -> Result<ListEventsResponse, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;

        let endpoint = Self::events_endpoint(calendar_id)?;
        let mut page_token: Option<String> = None;
        let mut time_zone: Option<String> = None;
        let mut events = Vec::new();

        loop {
            let mut req = self.client.get(endpoint.clone()).bearer_auth(access_token);
            req = req.query(&[
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
                ("maxResults", "250"),
            ]);
            req = req.query(&[
                ("timeMin", request.time_min.to_rfc3339()),
                ("timeMax", request.time_max.to_rfc3339()),
            ]);
            if let Some(page_token) = page_token.as_deref() {
                req = req.query(&[("pageToken", page_token)]);
            }

            let response = req.send().await.map_err(|error| {
                InfraError::FetchFailed(format!("network error while listing calendar events: {error}"))
            })?;

            let status = response.status();
            let body = response.text().await.map_err(|error| {
                InfraError::FetchFailed(format!("failed reading events list response: {error}"))
            })?;

            if !status.is_success() {
                return Err(Self::http_error(status, &body));
            }

            let mut parsed: EventsPageResponse = serde_json::from_str(&body).map_err(|error| {
                InfraError::FetchFailed(format!("invalid events list payload: {error}; body={body}"))
            })?;

            events.extend(parsed.items.take().unwrap_or_default());
            if time_zone.is_none() {
                time_zone = parsed
                    .time_zone
                    .take()
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty());
            }

            if let Some(next_page_token) = parsed.next_page_token.take() {
                page_token = Some(next_page_token);
                continue;
            }
            break;
        }

        Ok(ListEventsResponse { events, time_zone })
    }
}
