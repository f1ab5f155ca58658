use crate::domain::models::RelativeDay;
use crate::domain::time_source::TimeSource;
use chrono::{Duration, NaiveDate};
use chrono_tz::Tz;

/// The day the widget is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayCursor {
    selected_date: NaiveDate,
}

impl DayCursor {
    pub fn new(selected_date: NaiveDate) -> Self {
        Self { selected_date }
    }

    pub fn selected_date(&self) -> NaiveDate {
        self.selected_date
    }

    /// Moves by `delta_days`. At the edge of chrono's date range the
    /// cursor stays where it is.
    pub fn advance(&mut self, delta_days: i64) -> NaiveDate {
        if let Some(moved) = Duration::try_days(delta_days)
            .and_then(|delta| self.selected_date.checked_add_signed(delta))
        {
            self.selected_date = moved;
        }
        self.selected_date
    }

    pub fn reset_to_today(&mut self, time: &TimeSource, zone: Option<Tz>) -> NaiveDate {
        self.selected_date = time.today(zone);
        self.selected_date
    }

    pub fn relative_to(&self, today: NaiveDate) -> RelativeDay {
        match (self.selected_date - today).num_days() {
            0 => RelativeDay::Today,
            -1 => RelativeDay::Yesterday,
            1 => RelativeDay::Tomorrow,
            _ => RelativeDay::Other,
        }
    }
}
