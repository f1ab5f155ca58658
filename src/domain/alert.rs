use crate::domain::models::{AlertFired, EventSet};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;

/// How often the engine checks for upcoming events.
pub const ALERT_CHECK_INTERVAL: Duration = Duration::from_secs(30);
/// How far ahead of an event's start the alert fires.
pub const ALERT_LEAD_MINUTES: i64 = 5;

const MILLIS_PER_MINUTE: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertPhase {
    Disarmed,
    Armed,
}

#[derive(Debug, Clone)]
pub struct AlertScheduler {
    phase: AlertPhase,
    fired_keys: HashSet<String>,
    lead_millis: i64,
}

impl Default for AlertScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertScheduler {
    pub fn new() -> Self {
        Self {
            phase: AlertPhase::Disarmed,
            fired_keys: HashSet::new(),
            lead_millis: ALERT_LEAD_MINUTES * MILLIS_PER_MINUTE,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.phase == AlertPhase::Armed
    }

    /// Flips between armed and disarmed. Arming forgets every alert
    /// already fired, so those events may alert again.
    pub fn toggle(&mut self) -> AlertPhase {
        self.phase = match self.phase {
            AlertPhase::Disarmed => {
                self.fired_keys.clear();
                AlertPhase::Armed
            }
            AlertPhase::Armed => AlertPhase::Disarmed,
        };
        self.phase
    }

    pub fn fired_count(&self) -> usize {
        self.fired_keys.len()
    }

    /// Returns the alerts that became due at `now`. Each event fires at most
    /// once per arming, and never once its start has passed.
    pub fn tick(&mut self, event_set: Option<&EventSet>, now: DateTime<Utc>) -> Vec<AlertFired> {
        if self.phase != AlertPhase::Armed {
            return Vec::new();
        }
        let Some(event_set) = event_set else {
            return Vec::new();
        };

        let mut fired = Vec::new();
        for event in &event_set.events {
            let Some((start, _)) = event.timed_range() else {
                continue;
            };
            let Some(key) = event.alert_key() else {
                continue;
            };
            if self.fired_keys.contains(&key) {
                continue;
            }

            let millis_until_start = (start - now).num_milliseconds();
            if millis_until_start <= 0 || millis_until_start > self.lead_millis {
                continue;
            }

            self.fired_keys.insert(key);
            fired.push(AlertFired {
                event: event.clone(),
                minutes_remaining: millis_until_start / MILLIS_PER_MINUTE,
            });
        }
        fired
    }
}
