use crate::application::ports::{CalendarSource, RawEventList};
use crate::infrastructure::error::InfraError;
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    pub generation: u64,
    pub date: NaiveDate,
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub ticket: RefreshTicket,
    pub result: Result<RawEventList, InfraError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRequest {
    /// A fetch was spawned for this ticket.
    Started(RefreshTicket),
    /// A fetch for the same date is already in flight.
    Coalesced(RefreshTicket),
}

impl RefreshRequest {
    pub fn ticket(self) -> RefreshTicket {
        match self {
            Self::Started(ticket) | Self::Coalesced(ticket) => ticket,
        }
    }
}

/// Spawns fetches and decides which completions may be applied. Only the
/// most recently issued ticket is ever accepted, so results land in request
/// order regardless of completion order.
pub struct RefreshCoordinator {
    source: Arc<dyn CalendarSource>,
    outcomes: mpsc::UnboundedSender<FetchOutcome>,
    generation: u64,
    pending: Option<RefreshTicket>,
}

impl RefreshCoordinator {
    pub fn new(source: Arc<dyn CalendarSource>, outcomes: mpsc::UnboundedSender<FetchOutcome>) -> Self {
        Self {
            source,
            outcomes,
            generation: 0,
            pending: None,
        }
    }

    pub fn pending(&self) -> Option<RefreshTicket> {
        self.pending
    }

    /// Must be called from within a tokio runtime.
    pub fn request_refresh(&mut self, date: NaiveDate, zone: Option<Tz>) -> RefreshRequest {
        if let Some(pending) = self.pending.filter(|pending| pending.date == date) {
            debug!(generation = pending.generation, %date, "refresh coalesced into pending fetch");
            return RefreshRequest::Coalesced(pending);
        }
        if let Some(stale) = self.pending {
            debug!(
                generation = stale.generation,
                date = %stale.date,
                "pending fetch superseded"
            );
        }

        self.generation += 1;
        let ticket = RefreshTicket {
            generation: self.generation,
            date,
        };
        self.pending = Some(ticket);

        let source = Arc::clone(&self.source);
        let outcomes = self.outcomes.clone();
        tokio::spawn(async move {
            let result = source.fetch_events(date, zone).await;
            // The engine may already be gone; nothing to report to then.
            let _ = outcomes.send(FetchOutcome { ticket, result });
        });

        debug!(generation = ticket.generation, %date, "calendar fetch started");
        RefreshRequest::Started(ticket)
    }

    /// True when `ticket` is the latest request; it then stops being pending.
    pub fn accept(&mut self, ticket: RefreshTicket) -> bool {
        match self.pending {
            Some(pending) if pending == ticket => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}
