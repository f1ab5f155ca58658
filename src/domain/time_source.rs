use chrono::{DateTime, Local, NaiveDate, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::sync::Arc;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Injectable clock. Production uses the system clock; tests pin it.
#[derive(Clone)]
pub struct TimeSource {
    now_provider: NowProvider,
}

impl TimeSource {
    pub fn system() -> Self {
        Self {
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn fixed(instant: DateTime<Utc>) -> Self {
        Self {
            now_provider: Arc::new(move || instant),
        }
    }

    pub fn from_provider(now_provider: NowProvider) -> Self {
        Self { now_provider }
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    pub fn now_in(&self, zone: Tz) -> DateTime<Tz> {
        self.now_utc().with_timezone(&zone)
    }

    /// Today's civil date in `zone`, or on the machine clock when no
    /// calendar zone is known yet.
    pub fn today(&self, zone: Option<Tz>) -> NaiveDate {
        match zone {
            Some(zone) => self.now_in(zone).date_naive(),
            None => self.now_utc().with_timezone(&Local).date_naive(),
        }
    }
}

impl Default for TimeSource {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for TimeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeSource")
            .field("now", &self.now_utc())
            .finish()
    }
}
