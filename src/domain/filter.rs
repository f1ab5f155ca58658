use crate::domain::day_cursor::DayCursor;
use crate::domain::models::{EmptyReason, Event, EventSet, ViewModel, VisibleEvent};
use chrono::{DateTime, Utc};

/// True iff a timed event spans `now`, both ends inclusive. All-day and
/// unparsable events are never current.
pub fn is_current(event: &Event, now: DateTime<Utc>) -> bool {
    event
        .timed_range()
        .map(|(start, end)| start <= now && now <= end)
        .unwrap_or(false)
}

fn has_ended(event: &Event, now: DateTime<Utc>) -> bool {
    event
        .timed_range()
        .map(|(_, end)| end < now)
        .unwrap_or(false)
}

/// Derives what the widget shows for `cursor` from the active snapshot.
pub fn compute_view_model(event_set: &EventSet, cursor: &DayCursor, now: DateTime<Utc>) -> ViewModel {
    let today = now.with_timezone(&event_set.timezone).date_naive();
    let selected_date = cursor.selected_date();
    let relative_day = cursor.relative_to(today);

    if event_set.date != selected_date {
        return ViewModel::loading(selected_date, relative_day);
    }

    let is_today = selected_date == today;
    let visible_events: Vec<VisibleEvent> = event_set
        .events
        .iter()
        .filter(|event| !(is_today && has_ended(event, now)))
        .map(|event| VisibleEvent {
            event: event.clone(),
            is_current: is_today && is_current(event, now),
        })
        .collect();

    let empty_reason = if event_set.events.is_empty() {
        EmptyReason::NoEvents
    } else if visible_events.is_empty() {
        EmptyReason::AllPast
    } else {
        EmptyReason::None
    };

    ViewModel {
        selected_date,
        relative_day,
        visible_events,
        empty_reason,
        error: None,
        login_required: false,
        loading: false,
        alerts_enabled: false,
    }
}
