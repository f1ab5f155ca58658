use crate::application::ports::{AuthProvider, CalendarSource, DisplaySink, Notifier};
use crate::application::refresh::{FetchOutcome, RefreshCoordinator, RefreshRequest};
use crate::domain::alert::{AlertScheduler, ALERT_CHECK_INTERVAL};
use crate::domain::day_cursor::DayCursor;
use crate::domain::filter::compute_view_model;
use crate::domain::models::{EventSet, ViewModel};
use crate::domain::time_source::TimeSource;
use crate::infrastructure::activity_log::ActivityLog;
use crate::infrastructure::config::{detect_machine_zone, parse_zone};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::normalize_events;
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

type LoginResult = Result<(), InfraError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    NextDay,
    PreviousDay,
    GoToday,
    Refresh,
    ToggleAlerts,
    Login,
    Logout,
    Shutdown,
}

impl EngineCommand {
    fn as_str(self) -> &'static str {
        match self {
            Self::NextDay => "next_day",
            Self::PreviousDay => "previous_day",
            Self::GoToday => "go_today",
            Self::Refresh => "refresh",
            Self::ToggleAlerts => "toggle_alerts",
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Cheap, cloneable way for the presentation layer to drive the engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    /// Handle with no engine behind it; commands land on the returned receiver.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<EngineCommand>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        (Self { commands }, receiver)
    }

    pub fn send(&self, command: EngineCommand) -> Result<(), InfraError> {
        self.commands
            .send(command)
            .map_err(|_| InfraError::EngineStopped)
    }

    pub fn next_day(&self) -> Result<(), InfraError> {
        self.send(EngineCommand::NextDay)
    }

    pub fn previous_day(&self) -> Result<(), InfraError> {
        self.send(EngineCommand::PreviousDay)
    }

    pub fn go_today(&self) -> Result<(), InfraError> {
        self.send(EngineCommand::GoToday)
    }

    pub fn refresh(&self) -> Result<(), InfraError> {
        self.send(EngineCommand::Refresh)
    }

    pub fn toggle_alerts(&self) -> Result<(), InfraError> {
        self.send(EngineCommand::ToggleAlerts)
    }

    pub fn login(&self) -> Result<(), InfraError> {
        self.send(EngineCommand::Login)
    }

    pub fn logout(&self) -> Result<(), InfraError> {
        self.send(EngineCommand::Logout)
    }

    pub fn shutdown(&self) -> Result<(), InfraError> {
        self.send(EngineCommand::Shutdown)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ViewError {
    message: String,
    login_required: bool,
}

impl ViewError {
    fn from_error(error: &InfraError) -> Self {
        Self {
            message: error.to_string(),
            login_required: error.requires_login(),
        }
    }
}

#[derive(Debug)]
struct EngineState {
    cursor: DayCursor,
    event_set: Option<EventSet>,
    known_zone: Option<Tz>,
    alerts: AlertScheduler,
    error: Option<ViewError>,
    published: Option<ViewModel>,
}

/// Owns all mutable widget state. Every method runs on the engine task.
struct EngineCore {
    state: EngineState,
    coordinator: RefreshCoordinator,
    auth: Arc<dyn AuthProvider>,
    display: Arc<dyn DisplaySink>,
    notifier: Arc<dyn Notifier>,
    time: TimeSource,
    machine_zone: Option<Tz>,
    fallback_zone: Tz,
    activity_log: Option<Arc<ActivityLog>>,
    logins: mpsc::UnboundedSender<LoginResult>,
}

pub struct Engine {
    core: EngineCore,
    alert_period: Duration,
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    outcomes: mpsc::UnboundedReceiver<FetchOutcome>,
    logins: mpsc::UnboundedReceiver<LoginResult>,
}

impl Engine {
    pub fn new(
        source: Arc<dyn CalendarSource>,
        auth: Arc<dyn AuthProvider>,
        display: Arc<dyn DisplaySink>,
        notifier: Arc<dyn Notifier>,
    ) -> (Self, EngineHandle) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let (logins_tx, logins_rx) = mpsc::unbounded_channel();
        let time = TimeSource::system();
        let machine_zone = detect_machine_zone();

        let core = EngineCore {
            state: EngineState {
                cursor: DayCursor::new(time.today(machine_zone)),
                event_set: None,
                known_zone: None,
                alerts: AlertScheduler::new(),
                error: None,
                published: None,
            },
            coordinator: RefreshCoordinator::new(source, outcomes_tx),
            auth,
            display,
            notifier,
            time,
            machine_zone,
            fallback_zone: chrono_tz::UTC,
            activity_log: None,
            logins: logins_tx,
        };

        let engine = Self {
            core,
            alert_period: ALERT_CHECK_INTERVAL,
            commands: commands_rx,
            outcomes: outcomes_rx,
            logins: logins_rx,
        };
        (engine, EngineHandle { commands: commands_tx })
    }

    pub fn with_time_source(mut self, time: TimeSource) -> Self {
        self.core.time = time;
        self
    }

    /// Overrides the detected machine zone; `None` leaves only the fallback.
    pub fn with_machine_zone(mut self, zone: Option<Tz>) -> Self {
        self.core.machine_zone = zone;
        self
    }

    /// Last resort when no calendar zone was learned and the machine zone
    /// is unknown.
    pub fn with_fallback_zone(mut self, zone: Tz) -> Self {
        self.core.fallback_zone = zone;
        self
    }

    pub fn with_alert_period(mut self, period: Duration) -> Self {
        self.alert_period = period;
        self
    }

    pub fn with_activity_log(mut self, activity_log: Arc<ActivityLog>) -> Self {
        self.core.activity_log = Some(activity_log);
        self
    }

    /// Runs until [`EngineHandle::shutdown`] or until every handle is dropped.
    pub async fn run(self) {
        let Engine {
            mut core,
            alert_period,
            mut commands,
            mut outcomes,
            mut logins,
        } = self;

        core.start();
        let mut ticker = tokio::time::interval(alert_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(EngineCommand::Shutdown) | None => break,
                    Some(command) => core.handle_command(command),
                },
                Some(outcome) = outcomes.recv() => core.apply_fetch(outcome),
                Some(result) = logins.recv() => core.apply_login(result),
                _ = ticker.tick() => core.tick(),
            }
        }

        info!("calendar engine stopped");
    }
}

impl EngineCore {
    fn start(&mut self) {
        let date = self.state.cursor.reset_to_today(&self.time, self.today_zone());
        info!(%date, "calendar engine started");

        if self.auth.is_logged_in() {
            self.request_refresh();
        } else {
            info!("no calendar credentials; waiting for login");
            self.state.error = Some(ViewError::from_error(&InfraError::AuthMissing));
        }
        self.publish_view();
    }

    fn handle_command(&mut self, command: EngineCommand) {
        debug!(command = command.as_str(), "engine command");
        match command {
            EngineCommand::NextDay => {
                self.state.cursor.advance(1);
                self.after_cursor_change(command);
            }
            EngineCommand::PreviousDay => {
                self.state.cursor.advance(-1);
                self.after_cursor_change(command);
            }
            EngineCommand::GoToday => {
                self.state
                    .cursor
                    .reset_to_today(&self.time, self.today_zone());
                self.after_cursor_change(command);
            }
            EngineCommand::Refresh => self.request_refresh(),
            EngineCommand::ToggleAlerts => {
                let phase = self.state.alerts.toggle();
                info!(?phase, "alerts toggled");
                self.record_info(command, &format!("alerts {phase:?}"));
                self.publish_view();
            }
            EngineCommand::Login => self.begin_login(),
            EngineCommand::Logout => {
                self.auth.logout();
                info!("logged out");
                self.record_info(command, "logged out");
                self.state.error = Some(ViewError::from_error(&InfraError::AuthMissing));
                self.publish_view();
            }
            EngineCommand::Shutdown => {}
        }
    }

    fn after_cursor_change(&mut self, command: EngineCommand) {
        let date = self.state.cursor.selected_date();
        info!(%date, "selected day changed");
        self.record_info(command, &format!("selected {date}"));
        self.request_refresh();
        self.publish_view();
    }

    fn request_refresh(&mut self) {
        let date = self.state.cursor.selected_date();
        let request = self
            .coordinator
            .request_refresh(date, self.state.known_zone);
        debug!(
            generation = request.ticket().generation,
            %date,
            coalesced = matches!(request, RefreshRequest::Coalesced(_)),
            "refresh requested"
        );
    }

    fn begin_login(&mut self) {
        info!("login started");
        let auth = Arc::clone(&self.auth);
        let logins = self.logins.clone();
        tokio::spawn(async move {
            let result = auth.login().await;
            let _ = logins.send(result);
        });
    }

    fn apply_login(&mut self, result: LoginResult) {
        match result {
            Ok(()) => {
                info!("login completed");
                self.record_info(EngineCommand::Login, "login completed");
                self.state.error = None;
                self.request_refresh();
            }
            Err(error) => {
                warn!(%error, "login failed");
                self.record_error(EngineCommand::Login, &error.to_string());
                self.state.error = Some(ViewError::from_error(&error));
            }
        }
        self.publish_view();
    }

    fn apply_fetch(&mut self, outcome: FetchOutcome) {
        let FetchOutcome { ticket, result } = outcome;
        if !self.coordinator.accept(ticket) {
            debug!(
                generation = ticket.generation,
                date = %ticket.date,
                pending = ?self.coordinator.pending(),
                "discarding superseded calendar fetch"
            );
            return;
        }

        match result {
            Ok(list) => {
                let zone = self.resolve_zone(list.time_zone.as_deref());
                let events = normalize_events(&list.events, zone);
                info!(
                    date = %ticket.date,
                    zone = %zone,
                    count = events.len(),
                    "calendar events applied"
                );
                self.record_info(
                    EngineCommand::Refresh,
                    &format!("{} events for {}", events.len(), ticket.date),
                );
                self.state.event_set = Some(EventSet {
                    events,
                    timezone: zone,
                    date: ticket.date,
                    fetched_at: self.time.now_utc(),
                });
                self.state.known_zone = Some(zone);
                self.state.error = None;
            }
            Err(error) => {
                warn!(date = %ticket.date, %error, "calendar fetch failed");
                self.record_error(EngineCommand::Refresh, &error.to_string());
                self.state.error = Some(ViewError::from_error(&error));
            }
        }
        self.publish_view();
    }

    /// Zone deciding "today": the calendar's once known, the machine's before.
    fn today_zone(&self) -> Option<Tz> {
        self.state.known_zone.or(self.machine_zone)
    }

    /// Declared zone first, then the zone learned earlier, then the machine
    /// zone, then the fallback.
    fn resolve_zone(&self, declared: Option<&str>) -> Tz {
        let learned = self.today_zone().unwrap_or(self.fallback_zone);
        match declared.map(parse_zone) {
            Some(Ok(zone)) => zone,
            Some(Err(error)) => {
                warn!(%error, fallback = %learned, "calendar declared an unknown timezone");
                learned
            }
            None => learned,
        }
    }

    fn tick(&mut self) {
        let now = self.time.now_utc();
        let fired = self.state.alerts.tick(self.state.event_set.as_ref(), now);
        for alert in &fired {
            info!(
                summary = alert.event.summary.as_str(),
                minutes_remaining = alert.minutes_remaining,
                "alert fired"
            );
            self.notifier.on_alert_fired(alert);
        }
        if !fired.is_empty() {
            debug!(fired_total = self.state.alerts.fired_count(), "alerts fired this arming");
        }
        // Elapsed filtering depends on the clock, so the view may have moved.
        self.publish_view();
    }

    fn current_view(&self) -> ViewModel {
        let now = self.time.now_utc();
        let cursor = &self.state.cursor;
        let relative_day = cursor.relative_to(self.time.today(self.today_zone()));

        let mut view = match (&self.state.error, &self.state.event_set) {
            (Some(error), _) => ViewModel::error(
                cursor.selected_date(),
                relative_day,
                error.message.clone(),
                error.login_required,
            ),
            (None, Some(event_set)) => compute_view_model(event_set, cursor, now),
            (None, None) => ViewModel::loading(cursor.selected_date(), relative_day),
        };
        view.alerts_enabled = self.state.alerts.is_armed();
        view
    }

    fn publish_view(&mut self) {
        let view = self.current_view();
        if self.state.published.as_ref() == Some(&view) {
            return;
        }
        self.display.on_view_model_changed(&view);
        self.state.published = Some(view);
    }

    fn record_info(&self, command: EngineCommand, message: &str) {
        if let Some(log) = &self.activity_log {
            log.info(self.time.now_utc(), command.as_str(), message);
        }
    }

    fn record_error(&self, command: EngineCommand, message: &str) {
        if let Some(log) = &self.activity_log {
            log.error(self.time.now_utc(), command.as_str(), message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::RawEventList;
    use crate::application::testing::{
        instant, raw_timed, FakeAuth, GatedCalendarSource, ManualClock, RecordingDisplay,
        RecordingNotifier,
    };
    use crate::domain::models::{EmptyReason, RelativeDay};
    use crate::infrastructure::event_mapper::{CalendarEventDateTime, RawCalendarEvent};
    use chrono::NaiveDate;

    struct Harness {
        core: EngineCore,
        outcomes: mpsc::UnboundedReceiver<FetchOutcome>,
        logins: mpsc::UnboundedReceiver<LoginResult>,
        source: Arc<GatedCalendarSource>,
        auth: Arc<FakeAuth>,
        display: Arc<RecordingDisplay>,
        notifier: Arc<RecordingNotifier>,
        clock: ManualClock,
    }

    impl Harness {
        fn new(auth: FakeAuth, now: &str) -> Self {
            let source = Arc::new(GatedCalendarSource::default());
            let auth = Arc::new(auth);
            let display = Arc::new(RecordingDisplay::default());
            let notifier = Arc::new(RecordingNotifier::default());
            let clock = ManualClock::starting_at(instant(now));

            let (engine, _handle) = Engine::new(
                source.clone(),
                auth.clone(),
                display.clone(),
                notifier.clone(),
            );
            let engine = engine
                .with_time_source(clock.time_source())
                .with_machine_zone(None);
            let Engine {
                core,
                outcomes,
                logins,
                ..
            } = engine;

            Self {
                core,
                outcomes,
                logins,
                source,
                auth,
                display,
                notifier,
                clock,
            }
        }

        async fn deliver_next_fetch(&mut self) {
            let outcome = self.outcomes.recv().await.expect("fetch outcome");
            self.core.apply_fetch(outcome);
        }
    }

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).expect("valid date")
    }

    fn tokyo_day(events: Vec<RawCalendarEvent>) -> RawEventList {
        RawEventList {
            events,
            time_zone: Some("Asia/Tokyo".to_string()),
        }
    }

    fn design_review() -> RawCalendarEvent {
        raw_timed(
            "Design review",
            "2024-06-01T10:00:00+09:00",
            "2024-06-01T11:00:00+09:00",
        )
    }

    fn summaries(view: &ViewModel) -> Vec<String> {
        view.visible_events
            .iter()
            .map(|visible| visible.event.summary.clone())
            .collect()
    }

    // 09:00 in Tokyo.
    const TOKYO_MORNING: &str = "2024-06-01T00:00:00Z";

    #[tokio::test]
    async fn startup_fetches_today_and_applies_calendar_zone() {
        let mut harness = Harness::new(FakeAuth::logged_in(), TOKYO_MORNING);
        // Before any fetch the machine's local zone decides "today".
        let bootstrap_day = harness.core.time.today(None);
        let gate = harness.source.gate(bootstrap_day);
        harness.core.start();
        assert!(harness.display.last().loading);

        gate.send(Ok(tokyo_day(vec![design_review()])))
            .expect("send day");
        harness.deliver_next_fetch().await;

        assert_eq!(harness.source.calls(), vec![(bootstrap_day, None)]);
        assert_eq!(harness.core.state.known_zone, Some(chrono_tz::Asia::Tokyo));
        assert_eq!(harness.display.last().selected_date, bootstrap_day);
        assert!(!harness.display.last().loading);
    }

    #[tokio::test]
    async fn logged_out_start_shows_login_and_does_not_fetch() {
        let mut harness = Harness::new(FakeAuth::logged_out(), TOKYO_MORNING);
        harness.core.start();

        let view = harness.display.last();
        assert!(view.login_required);
        assert!(view.error.is_some());
        tokio::task::yield_now().await;
        assert!(harness.source.calls().is_empty());

        harness.core.handle_command(EngineCommand::Login);
        let result = harness.logins.recv().await.expect("login result");
        harness.core.apply_login(result);
        harness.deliver_next_fetch().await;

        assert!(harness.auth.is_logged_in());
        assert_eq!(harness.source.calls().len(), 1);
        let view = harness.display.last();
        assert!(!view.login_required);
        assert!(view.error.is_none());
    }

    #[tokio::test]
    async fn failed_login_keeps_login_screen() {
        let mut harness = Harness::new(FakeAuth::logged_out(), TOKYO_MORNING);
        harness.auth.fail_logins();
        harness.core.start();

        harness.core.handle_command(EngineCommand::Login);
        let result = harness.logins.recv().await.expect("login result");
        harness.core.apply_login(result);

        assert!(harness.display.last().login_required);
        assert!(harness.source.calls().is_empty());
    }

    #[tokio::test]
    async fn superseded_fetch_never_reaches_the_display() {
        let mut harness = Harness::new(FakeAuth::logged_in(), TOKYO_MORNING);
        let start_day = harness.core.state.cursor.selected_date();
        let d1 = start_day.succ_opt().expect("d1");
        let d2 = d1.succ_opt().expect("d2");
        let d1_gate = harness.source.gate(d1);
        let d2_gate = harness.source.gate(d2);

        harness.core.handle_command(EngineCommand::NextDay);
        harness.core.handle_command(EngineCommand::NextDay);

        d2_gate
            .send(Ok(tokyo_day(vec![raw_timed(
                "D2 event",
                "2030-01-01T10:00:00+09:00",
                "2030-01-01T11:00:00+09:00",
            )])))
            .expect("send d2");
        harness.deliver_next_fetch().await;
        d1_gate
            .send(Ok(tokyo_day(vec![raw_timed(
                "D1 event",
                "2030-01-01T10:00:00+09:00",
                "2030-01-01T11:00:00+09:00",
            )])))
            .expect("send d1");
        harness.deliver_next_fetch().await;

        let view = harness.display.last();
        assert_eq!(view.selected_date, d2);
        assert_eq!(summaries(&view), vec!["D2 event"]);
        assert_eq!(
            harness.core.state.event_set.as_ref().map(|set| set.date),
            Some(d2)
        );
        assert!(harness
            .display
            .views()
            .iter()
            .all(|view| !summaries(view).contains(&"D1 event".to_string())));
    }

    #[tokio::test]
    async fn navigation_is_not_blocked_by_pending_fetch() {
        let mut harness = Harness::new(FakeAuth::logged_in(), TOKYO_MORNING);
        let start_day = harness.core.state.cursor.selected_date();
        let _hung = harness.source.gate(start_day.succ_opt().expect("next"));

        harness.core.handle_command(EngineCommand::NextDay);
        harness.core.handle_command(EngineCommand::PreviousDay);

        let view = harness.display.last();
        assert_eq!(view.selected_date, start_day);
        assert!(view.loading);

        harness.deliver_next_fetch().await;
        assert!(!harness.display.last().loading);
    }

    #[tokio::test]
    async fn fetch_failure_replaces_view_but_keeps_event_set() {
        let mut harness = Harness::new(FakeAuth::logged_in(), "2024-06-01T00:50:00Z");
        harness.core.state.known_zone = Some(chrono_tz::Asia::Tokyo);
        let gate = harness.source.gate(date(6, 1));
        harness.core.handle_command(EngineCommand::GoToday);
        assert_eq!(harness.core.state.cursor.selected_date(), date(6, 1));

        gate.send(Ok(tokyo_day(vec![design_review()])))
            .expect("send day");
        harness.deliver_next_fetch().await;
        assert_eq!(summaries(&harness.display.last()), vec!["Design review"]);

        harness
            .source
            .gate(date(6, 1))
            .send(Err(InfraError::FetchFailed("http 503".to_string())))
            .expect("send failure");
        harness.core.handle_command(EngineCommand::Refresh);
        harness.deliver_next_fetch().await;

        let view = harness.display.last();
        assert!(view.visible_events.is_empty());
        assert_eq!(view.error.as_deref(), Some("Fetch failed: http 503"));
        assert!(!view.login_required);
        assert!(harness.core.state.event_set.is_some());

        // Alerts still run against the last good snapshot.
        harness.core.handle_command(EngineCommand::ToggleAlerts);
        harness.clock.set(instant("2024-06-01T09:56:00+09:00"));
        harness.core.tick();
        assert_eq!(harness.notifier.alerts().len(), 1);
    }

    #[tokio::test]
    async fn auth_failure_during_fetch_requests_login() {
        let mut harness = Harness::new(FakeAuth::logged_in(), TOKYO_MORNING);
        let today = harness.core.state.cursor.selected_date();
        harness
            .source
            .gate(today)
            .send(Err(InfraError::AuthMissing))
            .expect("send failure");
        harness.core.handle_command(EngineCommand::Refresh);
        harness.deliver_next_fetch().await;

        assert!(harness.display.last().login_required);
    }

    #[tokio::test]
    async fn tick_fires_each_alert_once_with_minutes_remaining() {
        let mut harness = Harness::new(FakeAuth::logged_in(), "2024-06-01T00:30:00Z");
        harness.core.state.known_zone = Some(chrono_tz::Asia::Tokyo);
        harness.source
            .gate(date(6, 1))
            .send(Ok(tokyo_day(vec![design_review()])))
            .expect("send day");
        harness.core.handle_command(EngineCommand::GoToday);
        harness.deliver_next_fetch().await;

        harness.core.handle_command(EngineCommand::ToggleAlerts);
        assert!(harness.display.last().alerts_enabled);

        harness.clock.set(instant("2024-06-01T09:56:00+09:00"));
        harness.core.tick();
        harness.clock.set(instant("2024-06-01T09:56:30+09:00"));
        harness.core.tick();
        harness.clock.set(instant("2024-06-01T09:59:30+09:00"));
        harness.core.tick();

        let alerts = harness.notifier.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].minutes_remaining, 4);
        assert_eq!(alerts[0].event.summary, "Design review");
    }

    #[tokio::test]
    async fn disarmed_ticks_produce_no_alerts() {
        let mut harness = Harness::new(FakeAuth::logged_in(), "2024-06-01T00:30:00Z");
        harness.core.state.known_zone = Some(chrono_tz::Asia::Tokyo);
        harness.source
            .gate(date(6, 1))
            .send(Ok(tokyo_day(vec![design_review()])))
            .expect("send day");
        harness.core.handle_command(EngineCommand::GoToday);
        harness.deliver_next_fetch().await;

        harness.clock.set(instant("2024-06-01T09:57:00+09:00"));
        harness.core.tick();
        assert!(harness.notifier.alerts().is_empty());
    }

    #[tokio::test]
    async fn tick_drops_elapsed_events_from_today_view() {
        let mut harness = Harness::new(FakeAuth::logged_in(), "2024-06-01T00:30:00Z");
        harness.core.state.known_zone = Some(chrono_tz::Asia::Tokyo);
        harness.source
            .gate(date(6, 1))
            .send(Ok(tokyo_day(vec![design_review()])))
            .expect("send day");
        harness.core.handle_command(EngineCommand::GoToday);
        harness.deliver_next_fetch().await;
        assert_eq!(harness.display.last().empty_reason, EmptyReason::None);

        harness.clock.set(instant("2024-06-01T10:30:00+09:00"));
        harness.core.tick();
        assert!(harness.display.last().visible_events[0].is_current);

        harness.clock.set(instant("2024-06-01T11:30:00+09:00"));
        harness.core.tick();
        let view = harness.display.last();
        assert!(view.visible_events.is_empty());
        assert_eq!(view.empty_reason, EmptyReason::AllPast);
    }

    #[tokio::test]
    async fn unchanged_view_is_not_republished() {
        let mut harness = Harness::new(FakeAuth::logged_in(), TOKYO_MORNING);
        harness.core.start();
        let published = harness.display.views().len();

        harness.core.tick();
        harness.core.tick();
        assert_eq!(harness.display.views().len(), published);
    }

    #[tokio::test]
    async fn unparsable_event_stays_visible_beside_good_ones() {
        let mut harness = Harness::new(FakeAuth::logged_in(), "2024-06-01T00:30:00Z");
        harness.core.state.known_zone = Some(chrono_tz::Asia::Tokyo);
        let broken = RawCalendarEvent {
            summary: Some("Broken".to_string()),
            location: None,
            start: CalendarEventDateTime::timed("someday"),
            end: CalendarEventDateTime::timed("someday"),
        };
        harness
            .source
            .gate(date(6, 1))
            .send(Ok(tokyo_day(vec![broken, design_review()])))
            .expect("send day");
        harness.core.handle_command(EngineCommand::GoToday);
        harness.deliver_next_fetch().await;

        assert_eq!(
            summaries(&harness.display.last()),
            vec!["Broken", "Design review"]
        );
    }

    #[tokio::test]
    async fn undeclared_zone_is_read_in_machine_zone() {
        // 08:30 in Tokyo on June 1st, still May 31st in UTC.
        let mut harness = Harness::new(FakeAuth::logged_in(), "2024-05-31T23:30:00Z");
        harness.core.machine_zone = Some(chrono_tz::Asia::Tokyo);
        harness.core.fallback_zone = chrono_tz::Europe::Berlin;
        harness
            .source
            .gate(date(6, 1))
            .send(Ok(RawEventList {
                events: vec![raw_timed("Standup", "2024-06-01T08:34:00", "2024-06-01T09:00:00")],
                time_zone: None,
            }))
            .expect("send day");
        harness.core.start();
        harness.deliver_next_fetch().await;

        assert_eq!(harness.source.calls(), vec![(date(6, 1), None)]);
        assert_eq!(harness.core.state.known_zone, Some(chrono_tz::Asia::Tokyo));
        let view = harness.display.last();
        assert_eq!(view.relative_day, RelativeDay::Today);
        assert_eq!(summaries(&view), vec!["Standup"]);

        harness.core.handle_command(EngineCommand::ToggleAlerts);
        harness.core.tick();
        let alerts = harness.notifier.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].minutes_remaining, 4);
    }

    #[tokio::test]
    async fn activity_log_uses_engine_clock() {
        let dir = std::env::temp_dir().join(format!("daycal-engine-log-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create log dir");
        let log = Arc::new(ActivityLog::new(&dir));
        let _ = std::fs::remove_file(log.path());

        let mut harness = Harness::new(FakeAuth::logged_in(), TOKYO_MORNING);
        harness.core.activity_log = Some(log.clone());
        harness.core.handle_command(EngineCommand::ToggleAlerts);

        let raw = std::fs::read_to_string(log.path()).expect("read log");
        let record: serde_json::Value =
            serde_json::from_str(raw.lines().next().expect("one record")).expect("json line");
        assert_eq!(record["timestamp"], "2024-06-01T00:00:00+00:00");
        assert_eq!(record["command"], "toggle_alerts");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn unknown_declared_zone_falls_back() {
        let mut harness = Harness::new(FakeAuth::logged_in(), TOKYO_MORNING);
        harness.core.fallback_zone = chrono_tz::Europe::Berlin;
        let today = harness.core.state.cursor.selected_date();
        harness
            .source
            .gate(today)
            .send(Ok(RawEventList {
                events: Vec::new(),
                time_zone: Some("Mars/Olympus".to_string()),
            }))
            .expect("send day");
        harness.core.handle_command(EngineCommand::Refresh);
        harness.deliver_next_fetch().await;

        assert_eq!(harness.core.state.known_zone, Some(chrono_tz::Europe::Berlin));
    }

    #[tokio::test]
    async fn logout_shows_login_screen() {
        let mut harness = Harness::new(FakeAuth::logged_in(), TOKYO_MORNING);
        harness.core.start();
        harness.deliver_next_fetch().await;

        harness.core.handle_command(EngineCommand::Logout);
        assert!(!harness.auth.is_logged_in());
        assert!(harness.display.last().login_required);
    }

    #[tokio::test]
    async fn run_loop_processes_commands_until_shutdown() {
        let source = Arc::new(GatedCalendarSource::default());
        let display = Arc::new(RecordingDisplay::default());
        let (engine, handle) = Engine::new(
            source.clone(),
            Arc::new(FakeAuth::logged_in()),
            display.clone(),
            Arc::new(RecordingNotifier::default()),
        );
        let engine = engine
            .with_time_source(TimeSource::fixed(instant(TOKYO_MORNING)))
            .with_alert_period(Duration::from_millis(10));
        let task = tokio::spawn(engine.run());

        handle.toggle_alerts().expect("toggle");
        handle.next_day().expect("next day");
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let settled = display
                    .views()
                    .last()
                    .map(|view| view.alerts_enabled && !view.loading)
                    .unwrap_or(false);
                if settled && source.calls().len() >= 2 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("engine settles");

        handle.shutdown().expect("shutdown");
        task.await.expect("engine task joins");
        assert!(matches!(handle.refresh(), Err(InfraError::EngineStopped)));
    }
}
