//! OperationCoordinator - countdown, cancellation and at-most-once dispatch

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use contracts::{
    AlertDispatcher, AlertOutcome, AlertPayload, AlertServices, BeginOutcome, Classification,
    Contact, ContractError, EmergencyReport, EngineConfig, FeedbackHooks, OperationId, OperationState, Profile,
    Rejection, ReportSink, TriggerSource, UserDirectory, UserId,
};
use freshness_cache::FreshnessCache;
use location::{LocationResolver, PendingLocation};
use observability::{
    record_cancellation, record_countdown_started, record_outcome, record_rejection,
    record_report_submitted, record_trigger,
};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Generation value meaning "no active operation"
const NO_OPERATION: u64 = 0;

/// Every collaborator the coordinator talks to
pub struct Collaborators<S: AlertServices> {
    pub directory: Arc<S::Directory>,
    pub position: Arc<S::Position>,
    pub geocoder: Arc<S::Geocoder>,
    pub dispatcher: Arc<S::Dispatcher>,
    pub reports: Arc<S::Reports>,
}

impl<S: AlertServices> Clone for Collaborators<S> {
    fn clone(&self) -> Self {
        Self {
            directory: Arc::clone(&self.directory),
            position: Arc::clone(&self.position),
            geocoder: Arc::clone(&self.geocoder),
            dispatcher: Arc::clone(&self.dispatcher),
            reports: Arc::clone(&self.reports),
        }
    }
}

/// Countdown in progress
struct Countdown {
    id: OperationId,
    remaining: u32,
    source: TriggerSource,
    contacts: Vec<Contact>,
    location: PendingLocation,
    ticker: JoinHandle<()>,
}

/// Everything the dispatch step needs once the countdown expired
struct DispatchJob {
    id: OperationId,
    source: TriggerSource,
    contacts: Vec<Contact>,
    location: PendingLocation,
}

enum Phase {
    Idle,
    /// Pre-flight checks running; not visible as an [`OperationState`]
    Preparing,
    CountingDown(Countdown),
    Dispatching(OperationId),
}

impl Phase {
    /// Swap in `next` if counting down, returning the countdown
    fn take_countdown(&mut self, next: Phase) -> Option<Countdown> {
        match std::mem::replace(self, next) {
            Phase::CountingDown(countdown) => Some(countdown),
            other => {
                *self = other;
                None
            }
        }
    }
}

/// Result of one countdown tick
enum Tick {
    /// Captured id no longer active
    Stale,
    Remaining(u32),
    Expired(DispatchJob),
}

/// Resets the phase to `Idle` if pre-flight is abandoned
struct PreparingGuard<'a> {
    phase: &'a Mutex<Phase>,
}

impl Drop for PreparingGuard<'_> {
    fn drop(&mut self) {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*phase, Phase::Preparing) {
            *phase = Phase::Idle;
        }
    }
}

struct Shared<S: AlertServices> {
    user_id: UserId,
    config: EngineConfig,
    directory: Arc<S::Directory>,
    dispatcher: Arc<S::Dispatcher>,
    reports: Arc<S::Reports>,
    location: LocationResolver<S::Position, S::Geocoder>,
    classifications: FreshnessCache<UserId, Classification>,
    contacts: FreshnessCache<UserId, Vec<Contact>>,
    profiles: FreshnessCache<UserId, Option<Profile>>,
    hooks: Arc<dyn FeedbackHooks>,
    next_id: AtomicU64,
    /// Generation of the operation counting down or dispatching
    active_id: AtomicU64,
    phase: Mutex<Phase>,
}

impl<S: AlertServices> Shared<S> {
    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_active(&self, id: OperationId) -> bool {
        self.active_id.load(Ordering::Acquire) == id.0
    }

    /// Directory call bounded by `cache.lookup_timeout_ms`
    async fn lookup<T>(
        &self,
        lookup: &'static str,
        call: impl Future<Output = Result<T, ContractError>>,
    ) -> Result<T, ContractError> {
        let limit = self.config.cache.lookup_timeout();
        match timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    lookup,
                    timeout_ms = limit.as_millis() as u64,
                    "directory lookup timed out"
                );
                Err(ContractError::directory(
                    lookup,
                    self.user_id.as_str(),
                    "lookup timed out",
                ))
            }
        }
    }

    /// Classification and contact checks; the contacts to alert on success
    async fn preflight(&self) -> Result<Vec<Contact>, Rejection> {
        let user = &self.user_id;

        let classification = self
            .classifications
            .ensure(user.clone(), self.config.cache.classification_ttl(), || {
                self.lookup("classification", self.directory.caller_classification(user))
            })
            .await
            .map_err(|e| Rejection::ClassificationUnavailable {
                message: e.to_string(),
            })?
            .into_value();

        if !classification.is_eligible() {
            return Err(Rejection::Ineligible { classification });
        }

        let contacts = match self
            .contacts
            .ensure(user.clone(), self.config.cache.contacts_ttl(), || {
                self.lookup("primary_contacts", self.directory.primary_contacts(user))
            })
            .await
        {
            Ok(contacts) => contacts.into_value(),
            Err(e) => {
                warn!(error = %e, "primary contacts unavailable");
                Vec::new()
            }
        };

        if contacts.is_empty() {
            return Err(Rejection::NoContacts);
        }
        Ok(contacts)
    }

    /// Tear down a countdown that was already taken out of the phase
    fn cancelled(&self, countdown: Countdown) -> OperationId {
        let Countdown {
            id,
            remaining,
            location,
            ticker,
            ..
        } = countdown;

        ticker.abort();
        drop(location);
        self.location.release(id);
        record_cancellation(remaining);
        info!(operation_id = %id, remaining, "countdown cancelled");

        self.hooks.on_state_change(OperationState::Cancelled);
        self.hooks.on_state_change(OperationState::Idle);
        id
    }

    fn on_tick(&self, id: OperationId) -> Tick {
        if !self.is_active(id) {
            debug!(operation_id = %id, "stale countdown tick discarded");
            return Tick::Stale;
        }

        let mut phase = self.phase();
        let remaining = match &mut *phase {
            Phase::CountingDown(countdown) if countdown.id == id => {
                countdown.remaining = countdown.remaining.saturating_sub(1);
                countdown.remaining
            }
            _ => return Tick::Stale,
        };
        if remaining > 0 {
            return Tick::Remaining(remaining);
        }

        match phase.take_countdown(Phase::Dispatching(id)) {
            Some(countdown) => Tick::Expired(DispatchJob {
                id,
                source: countdown.source,
                contacts: countdown.contacts,
                location: countdown.location,
            }),
            None => Tick::Stale,
        }
    }

    async fn reporter_name(&self) -> String {
        let user = &self.user_id;
        let profile = self
            .profiles
            .ensure(user.clone(), self.config.cache.profile_ttl(), || {
                self.lookup("profile", self.directory.profile(user))
            })
            .await;

        let name = match profile {
            Ok(profile) => profile.into_value().and_then(|p| p.display_name()),
            Err(e) => {
                warn!(error = %e, "profile unavailable, using fallback identity");
                None
            }
        };
        name.unwrap_or_else(|| self.config.fallback_identity.clone())
    }

    /// File the report record in the background; its result is only logged
    fn submit_report(&self, payload: &AlertPayload) {
        let report = EmergencyReport::for_alert(payload);
        let sink = Arc::clone(&self.reports);
        let operation_id = payload.operation_id;

        tokio::spawn(async move {
            let sink_name = sink.name().to_string();
            match sink.submit_report(&report).await {
                Ok(()) => {
                    record_report_submitted(&sink_name, true);
                    info!(operation_id = %operation_id, sink = %sink_name, "emergency report submitted");
                }
                Err(e) => {
                    record_report_submitted(&sink_name, false);
                    warn!(operation_id = %operation_id, sink = %sink_name, error = %e, "emergency report failed");
                }
            }
        });
    }

    #[instrument(
        name = "coordinator_deliver",
        skip(self, job),
        fields(operation_id = %job.id, source = job.source.as_str(), contacts = job.contacts.len())
    )]
    async fn deliver(self: Arc<Self>, job: DispatchJob) -> AlertOutcome {
        let DispatchJob {
            id,
            contacts,
            location,
            ..
        } = job;

        let location = location.wait().await;
        let reporter_name = self.reporter_name().await;
        let payload = AlertPayload {
            operation_id: id,
            reporter_id: self.user_id.clone(),
            message: format!("Emergency SOS alert from {reporter_name}"),
            reporter_name,
            location,
            triggered_at: Utc::now(),
        };

        self.submit_report(&payload);

        match self.dispatcher.dispatch(&contacts, &payload).await {
            Ok(report) if report.success => AlertOutcome::Delivered {
                operation_id: id,
                sent_to: report.sent_to,
                errors: report.errors,
            },
            Ok(report) => AlertOutcome::Failed {
                operation_id: id,
                message: report
                    .errors
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| "alert delivery failed".to_string()),
            },
            Err(e) => AlertOutcome::Failed {
                operation_id: id,
                message: e.to_string(),
            },
        }
    }

    /// Run the dispatch step in its own task so a panic still finishes the
    /// operation
    async fn dispatch(self: &Arc<Self>, job: DispatchJob) {
        let id = job.id;
        let outcome = match tokio::spawn(Arc::clone(self).deliver(job)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(operation_id = %id, error = %e, "dispatch task aborted");
                AlertOutcome::Failed {
                    operation_id: id,
                    message: "unexpected error while sending the alert".to_string(),
                }
            }
        };
        self.finish(id, outcome);
    }

    fn finish(&self, id: OperationId, outcome: AlertOutcome) {
        {
            let mut phase = self.phase();
            if matches!(*phase, Phase::Dispatching(current) if current == id) {
                *phase = Phase::Idle;
            }
            let _ = self.active_id.compare_exchange(
                id.0,
                NO_OPERATION,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
        self.location.release(id);
        record_outcome(&outcome);

        match &outcome {
            AlertOutcome::Delivered {
                sent_to, errors, ..
            } => info!(operation_id = %id, sent_to, partial_errors = errors.len(), "alert delivered"),
            AlertOutcome::Failed { message, .. } => {
                warn!(operation_id = %id, error = %message, "alert dispatch failed")
            }
            AlertOutcome::Rejected(_) => {}
        }

        self.hooks.on_state_change(OperationState::Completed);
        self.hooks.on_outcome(&outcome);
        self.hooks.on_state_change(OperationState::Idle);
    }
}

async fn run_countdown<S: AlertServices>(shared: Arc<Shared<S>>, id: OperationId) {
    let tick = shared.config.countdown.tick();
    let mut ticks = interval_at(Instant::now() + tick, tick);

    loop {
        ticks.tick().await;
        match shared.on_tick(id) {
            Tick::Stale => return,
            Tick::Remaining(remaining) => {
                debug!(operation_id = %id, remaining, "countdown tick");
                shared.hooks.on_countdown_tick(id, remaining);
                shared
                    .hooks
                    .on_state_change(OperationState::CountingDown {
                        remaining_seconds: remaining,
                    });
            }
            Tick::Expired(job) => {
                shared.hooks.on_countdown_tick(id, 0);
                shared.hooks.on_state_change(OperationState::Dispatching);
                shared.dispatch(job).await;
                return;
            }
        }
    }
}

/// Single-intent alert coordinator
///
/// Cheap to clone; clones drive the same operation. A trigger while a
/// countdown runs cancels it, so every alert intent dispatches at most once.
pub struct OperationCoordinator<S: AlertServices> {
    shared: Arc<Shared<S>>,
}

impl<S: AlertServices> Clone for OperationCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: AlertServices> OperationCoordinator<S> {
    pub fn new(
        user_id: UserId,
        config: EngineConfig,
        services: Collaborators<S>,
        hooks: Arc<dyn FeedbackHooks>,
    ) -> Self {
        let capacity = config.cache.capacity;
        let location = LocationResolver::new(services.position, services.geocoder, config.location);

        Self {
            shared: Arc::new(Shared {
                user_id,
                directory: services.directory,
                dispatcher: services.dispatcher,
                reports: services.reports,
                location,
                classifications: FreshnessCache::new("classification", capacity),
                contacts: FreshnessCache::new("contacts", capacity),
                profiles: FreshnessCache::new("profile", capacity),
                hooks,
                next_id: AtomicU64::new(0),
                active_id: AtomicU64::new(NO_OPERATION),
                phase: Mutex::new(Phase::Idle),
                config,
            }),
        }
    }

    pub async fn on_manual_trigger(&self) -> BeginOutcome {
        self.begin(TriggerSource::Manual).await
    }

    pub async fn on_sensor_trigger(&self) -> BeginOutcome {
        self.begin(TriggerSource::Sensor).await
    }

    /// Start an alert intent, or cancel the one counting down
    ///
    /// Returns once the countdown has started (or was refused); dispatch
    /// happens in the background and is reported through the hooks.
    #[instrument(
        name = "coordinator_begin",
        skip(self, source),
        fields(user_id = %self.shared.user_id, source = source.as_str())
    )]
    pub async fn begin(&self, source: TriggerSource) -> BeginOutcome {
        let shared = &self.shared;
        record_trigger(source);

        let cancelled = {
            let mut phase = shared.phase();
            match std::mem::replace(&mut *phase, Phase::Preparing) {
                Phase::Idle => None,
                Phase::CountingDown(countdown) => {
                    *phase = Phase::Idle;
                    shared.active_id.store(NO_OPERATION, Ordering::Release);
                    Some(countdown)
                }
                busy => {
                    *phase = busy;
                    debug!("alert already in progress, trigger ignored");
                    return BeginOutcome::Busy;
                }
            }
        };
        if let Some(countdown) = cancelled {
            return BeginOutcome::Cancelled(shared.cancelled(countdown));
        }

        let guard = PreparingGuard {
            phase: &shared.phase,
        };
        let contacts = match shared.preflight().await {
            Ok(contacts) => contacts,
            Err(rejection) => {
                drop(guard);
                record_rejection(&rejection);
                warn!(reason = rejection.as_str(), "alert rejected: {rejection}");
                shared
                    .hooks
                    .on_outcome(&AlertOutcome::Rejected(rejection.clone()));
                return BeginOutcome::Rejected(rejection);
            }
        };

        let seconds = shared.config.countdown.seconds;
        let id = OperationId(shared.next_id.fetch_add(1, Ordering::AcqRel) + 1);
        let location = shared.location.resolve(id);
        {
            let mut phase = shared.phase();
            shared.active_id.store(id.0, Ordering::Release);
            let ticker = tokio::spawn(run_countdown(Arc::clone(shared), id));
            *phase = Phase::CountingDown(Countdown {
                id,
                remaining: seconds,
                source,
                contacts,
                location,
                ticker,
            });
        }
        drop(guard);

        record_countdown_started(seconds);
        info!(operation_id = %id, seconds, "countdown started");
        shared.hooks.on_state_change(OperationState::CountingDown {
            remaining_seconds: seconds,
        });
        shared.hooks.on_countdown_tick(id, seconds);

        BeginOutcome::Started(id)
    }

    /// Cancel the countdown in progress; no-op otherwise
    pub fn cancel(&self) -> Option<OperationId> {
        let countdown = {
            let mut phase = self.shared.phase();
            let countdown = phase.take_countdown(Phase::Idle)?;
            self.shared
                .active_id
                .store(NO_OPERATION, Ordering::Release);
            countdown
        };
        Some(self.shared.cancelled(countdown))
    }

    pub fn state(&self) -> OperationState {
        match &*self.shared.phase() {
            Phase::Idle | Phase::Preparing => OperationState::Idle,
            Phase::CountingDown(countdown) => OperationState::CountingDown {
                remaining_seconds: countdown.remaining,
            },
            Phase::Dispatching(_) => OperationState::Dispatching,
        }
    }

    /// Operation counting down or dispatching
    pub fn active_operation(&self) -> Option<OperationId> {
        match self.shared.active_id.load(Ordering::Acquire) {
            NO_OPERATION => None,
            id => Some(OperationId(id)),
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.shared.user_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        ContractError, Coordinates, DispatchReport, PositionOptions, PositionService,
        ReverseGeocoder,
    };
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::{advance, sleep};

    // ===== Test collaborators =====

    #[derive(Default)]
    struct TestDirectory {
        classification: Mutex<Option<Classification>>,
        contacts: Mutex<Option<Vec<Contact>>>,
        profile: Mutex<Option<Profile>>,
        contact_calls: AtomicU32,
        /// Lookup that never answers
        stalled: Option<&'static str>,
    }

    impl TestDirectory {
        async fn answer(&self, lookup: &'static str) {
            if self.stalled == Some(lookup) {
                std::future::pending::<()>().await;
            }
        }

        fn civilian() -> Self {
            Self {
                classification: Mutex::new(Some(Classification::Civilian)),
                contacts: Mutex::new(Some(vec![contact("Mom"), contact("Dad")])),
                profile: Mutex::new(Some(Profile {
                    first_name: "Ana".into(),
                    last_name: "Cruz".into(),
                })),
                ..Default::default()
            }
        }
    }

    impl UserDirectory for TestDirectory {
        async fn caller_classification(
            &self,
            user_id: &UserId,
        ) -> Result<Classification, ContractError> {
            self.answer("classification").await;
            let classification = *self.classification.lock().unwrap();
            classification.ok_or_else(|| {
                ContractError::directory("classification", user_id.as_str(), "down")
            })
        }

        async fn primary_contacts(&self, user_id: &UserId) -> Result<Vec<Contact>, ContractError> {
            self.contact_calls.fetch_add(1, Ordering::SeqCst);
            self.answer("primary_contacts").await;
            let contacts = self.contacts.lock().unwrap().clone();
            contacts.ok_or_else(|| {
                ContractError::directory("primary_contacts", user_id.as_str(), "down")
            })
        }

        async fn profile(&self, _user_id: &UserId) -> Result<Option<Profile>, ContractError> {
            self.answer("profile").await;
            Ok(self.profile.lock().unwrap().clone())
        }
    }

    struct TestPosition {
        delay: Duration,
        hang: bool,
    }

    impl PositionService for TestPosition {
        async fn current_position(
            &self,
            _options: PositionOptions,
        ) -> Result<Coordinates, ContractError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            sleep(self.delay).await;
            Ok(Coordinates {
                latitude: 14.5995,
                longitude: 120.9842,
            })
        }
    }

    struct TestGeocoder;

    impl ReverseGeocoder for TestGeocoder {
        async fn lookup(&self, _latitude: f64, _longitude: f64) -> Result<String, ContractError> {
            Ok("Rizal Park, Manila".to_string())
        }
    }

    enum DispatchMode {
        Deliver,
        Reject,
        Unreachable,
        Panic,
    }

    struct TestDispatcher {
        mode: DispatchMode,
        sent: Mutex<Vec<AlertPayload>>,
    }

    impl AlertDispatcher for TestDispatcher {
        fn name(&self) -> &str {
            "test"
        }

        async fn dispatch(
            &self,
            contacts: &[Contact],
            payload: &AlertPayload,
        ) -> Result<DispatchReport, ContractError> {
            self.sent.lock().unwrap().push(payload.clone());
            match self.mode {
                DispatchMode::Deliver => Ok(DispatchReport {
                    success: true,
                    sent_to: contacts.len(),
                    errors: vec![],
                }),
                DispatchMode::Reject => Ok(DispatchReport {
                    success: false,
                    sent_to: 0,
                    errors: vec!["no push token for Mom".into(), "no push token for Dad".into()],
                }),
                DispatchMode::Unreachable => Err(ContractError::dispatch("gateway unreachable")),
                DispatchMode::Panic => panic!("malformed contact record"),
            }
        }
    }

    struct TestReports {
        fail: bool,
        submitted: AtomicU32,
    }

    impl ReportSink for TestReports {
        fn name(&self) -> &str {
            "test_reports"
        }

        async fn submit_report(&self, _report: &EmergencyReport) -> Result<(), ContractError> {
            self.submitted.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ContractError::report_write("test_reports", "quota exceeded"));
            }
            Ok(())
        }
    }

    struct TestServices;

    impl AlertServices for TestServices {
        type Directory = TestDirectory;
        type Position = TestPosition;
        type Geocoder = TestGeocoder;
        type Dispatcher = TestDispatcher;
        type Reports = TestReports;
    }

    /// Hooks forwarding every outcome to a channel
    struct OutcomeHooks {
        tx: mpsc::UnboundedSender<AlertOutcome>,
        ticks: Mutex<Vec<u32>>,
        states: Mutex<Vec<OperationState>>,
    }

    impl FeedbackHooks for OutcomeHooks {
        fn on_countdown_tick(&self, _operation_id: OperationId, remaining_seconds: u32) {
            self.ticks.lock().unwrap().push(remaining_seconds);
        }

        fn on_state_change(&self, state: OperationState) {
            self.states.lock().unwrap().push(state);
        }

        fn on_outcome(&self, outcome: &AlertOutcome) {
            let _ = self.tx.send(outcome.clone());
        }
    }

    fn contact(name: &str) -> Contact {
        Contact {
            id: name.to_lowercase(),
            name: name.into(),
            phone_number: "+63 900 000 0000".into(),
            relationship: "family".into(),
            is_primary: true,
        }
    }

    struct Harness {
        coordinator: OperationCoordinator<TestServices>,
        directory: Arc<TestDirectory>,
        dispatcher: Arc<TestDispatcher>,
        reports: Arc<TestReports>,
        hooks: Arc<OutcomeHooks>,
        outcomes: mpsc::UnboundedReceiver<AlertOutcome>,
    }

    struct Setup {
        directory: TestDirectory,
        position: TestPosition,
        mode: DispatchMode,
        failing_reports: bool,
    }

    impl Default for Setup {
        fn default() -> Self {
            Self {
                directory: TestDirectory::civilian(),
                position: TestPosition {
                    delay: Duration::from_millis(500),
                    hang: false,
                },
                mode: DispatchMode::Deliver,
                failing_reports: false,
            }
        }
    }

    impl Setup {
        fn build(self) -> Harness {
            let directory = Arc::new(self.directory);
            let dispatcher = Arc::new(TestDispatcher {
                mode: self.mode,
                sent: Mutex::new(Vec::new()),
            });
            let reports = Arc::new(TestReports {
                fail: self.failing_reports,
                submitted: AtomicU32::new(0),
            });
            let (tx, outcomes) = mpsc::unbounded_channel();
            let hooks = Arc::new(OutcomeHooks {
                tx,
                ticks: Mutex::new(Vec::new()),
                states: Mutex::new(Vec::new()),
            });

            let coordinator = OperationCoordinator::new(
                "civ-1".into(),
                EngineConfig::default(),
                Collaborators::<TestServices> {
                    directory: directory.clone(),
                    position: Arc::new(self.position),
                    geocoder: Arc::new(TestGeocoder),
                    dispatcher: dispatcher.clone(),
                    reports: reports.clone(),
                },
                hooks.clone(),
            );

            Harness {
                coordinator,
                directory,
                dispatcher,
                reports,
                hooks,
                outcomes,
            }
        }
    }

    impl Harness {
        fn dispatched(&self) -> usize {
            self.dispatcher.sent.lock().unwrap().len()
        }
    }

    // ===== Scenarios =====

    #[tokio::test(start_paused = true)]
    async fn test_countdown_then_delivery() {
        let mut h = Setup::default().build();

        let id = match h.coordinator.on_manual_trigger().await {
            BeginOutcome::Started(id) => id,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(
            h.coordinator.state(),
            OperationState::CountingDown {
                remaining_seconds: 5
            }
        );
        assert_eq!(h.coordinator.active_operation(), Some(id));

        let outcome = h.outcomes.recv().await.unwrap();
        assert_eq!(
            outcome,
            AlertOutcome::Delivered {
                operation_id: id,
                sent_to: 2,
                errors: vec![]
            }
        );
        assert_eq!(h.coordinator.state(), OperationState::Idle);
        assert_eq!(h.coordinator.active_operation(), None);
        assert_eq!(*h.hooks.ticks.lock().unwrap(), vec![5, 4, 3, 2, 1, 0]);

        let sent = h.dispatcher.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].reporter_name, "Ana Cruz");
        assert_eq!(sent[0].location.address, "Rizal Park, Manila");
        assert_eq!(sent[0].message, "Emergency SOS alert from Ana Cruz");
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_begin_cancels_without_dispatch() {
        let mut h = Setup {
            position: TestPosition {
                delay: Duration::from_secs(6),
                hang: false,
            },
            ..Default::default()
        }
        .build();

        let first = h.coordinator.begin(TriggerSource::Sensor).await;
        let BeginOutcome::Started(id) = first else {
            panic!("unexpected {first:?}");
        };

        advance(Duration::from_secs(2)).await;
        assert_eq!(
            h.coordinator.begin(TriggerSource::Manual).await,
            BeginOutcome::Cancelled(id)
        );
        assert_eq!(h.coordinator.state(), OperationState::Idle);

        // well past the countdown and the late location fix
        sleep(Duration::from_secs(15)).await;
        assert_eq!(h.dispatched(), 0);
        assert!(h.outcomes.try_recv().is_err());
        assert!(h
            .hooks
            .states
            .lock()
            .unwrap()
            .contains(&OperationState::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_operation_after_cancel_dispatches_once() {
        let mut h = Setup::default().build();

        let BeginOutcome::Started(first) = h.coordinator.on_manual_trigger().await else {
            panic!("expected start");
        };
        advance(Duration::from_millis(2500)).await;
        assert_eq!(h.coordinator.cancel(), Some(first));
        assert_eq!(h.coordinator.cancel(), None);

        let BeginOutcome::Started(second) = h.coordinator.on_manual_trigger().await else {
            panic!("expected start");
        };
        assert!(second > first);

        let outcome = h.outcomes.recv().await.unwrap();
        assert!(matches!(outcome, AlertOutcome::Delivered { operation_id, .. } if operation_id == second));

        sleep(Duration::from_secs(10)).await;
        assert_eq!(h.dispatched(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_tick_is_discarded() {
        let h = Setup::default().build();
        let BeginOutcome::Started(id) = h.coordinator.on_manual_trigger().await else {
            panic!("expected start");
        };
        h.coordinator.cancel();

        assert!(matches!(h.coordinator.shared.on_tick(id), Tick::Stale));
        assert_eq!(h.coordinator.state(), OperationState::Idle);
        assert_eq!(h.coordinator.active_operation(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_contacts_rejects_before_countdown() {
        let mut h = Setup {
            directory: TestDirectory {
                contacts: Mutex::new(None),
                ..TestDirectory::civilian()
            },
            ..Default::default()
        }
        .build();

        assert_eq!(
            h.coordinator.on_manual_trigger().await,
            BeginOutcome::Rejected(Rejection::NoContacts)
        );
        assert_eq!(h.coordinator.state(), OperationState::Idle);
        assert_eq!(
            h.outcomes.recv().await.unwrap(),
            AlertOutcome::Rejected(Rejection::NoContacts)
        );
        assert!(h.hooks.ticks.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_contact_list_rejects() {
        let h = Setup {
            directory: TestDirectory {
                contacts: Mutex::new(Some(vec![])),
                ..TestDirectory::civilian()
            },
            ..Default::default()
        }
        .build();

        assert_eq!(
            h.coordinator.on_manual_trigger().await,
            BeginOutcome::Rejected(Rejection::NoContacts)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_responder_is_ineligible() {
        let h = Setup {
            directory: TestDirectory {
                classification: Mutex::new(Some(Classification::Responder)),
                ..TestDirectory::civilian()
            },
            ..Default::default()
        }
        .build();

        assert_eq!(
            h.coordinator.on_sensor_trigger().await,
            BeginOutcome::Rejected(Rejection::Ineligible {
                classification: Classification::Responder
            })
        );
        assert_eq!(h.directory.contact_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_classification_rejects() {
        let h = Setup {
            directory: TestDirectory {
                classification: Mutex::new(None),
                ..TestDirectory::civilian()
            },
            ..Default::default()
        }
        .build();

        let outcome = h.coordinator.on_manual_trigger().await;
        assert!(matches!(
            outcome,
            BeginOutcome::Rejected(Rejection::ClassificationUnavailable { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_contacts_still_usable() {
        let mut h = Setup::default().build();

        let BeginOutcome::Started(_) = h.coordinator.on_manual_trigger().await else {
            panic!("expected start");
        };
        h.outcomes.recv().await.unwrap();

        // contacts expire (30 s) and the directory goes down
        sleep(Duration::from_secs(60)).await;
        *h.directory.contacts.lock().unwrap() = None;

        assert!(matches!(
            h.coordinator.on_manual_trigger().await,
            BeginOutcome::Started(_)
        ));
        assert!(h.outcomes.recv().await.unwrap().is_delivered());
        assert_eq!(h.directory.contact_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_location_waited_for_at_dispatch() {
        let mut h = Setup {
            position: TestPosition {
                delay: Duration::ZERO,
                hang: true,
            },
            ..Default::default()
        }
        .build();

        let started = Instant::now();
        h.coordinator.on_manual_trigger().await;
        assert!(h.outcomes.recv().await.unwrap().is_delivered());

        // the fix never arrives: dispatch waits for the 10 s location bound
        assert!(started.elapsed() >= Duration::from_secs(10));
        let sent = h.dispatcher.sent.lock().unwrap().clone();
        assert!(sent[0].location.is_fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_profile_falls_back_to_identity() {
        let mut h = Setup {
            directory: TestDirectory {
                stalled: Some("profile"),
                ..TestDirectory::civilian()
            },
            ..Default::default()
        }
        .build();

        let BeginOutcome::Started(id) = h.coordinator.on_manual_trigger().await else {
            panic!("expected start");
        };
        let outcome = h.outcomes.recv().await.unwrap();
        assert!(matches!(outcome, AlertOutcome::Delivered { operation_id, .. } if operation_id == id));
        assert_eq!(h.coordinator.state(), OperationState::Idle);

        let sent = h.dispatcher.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].reporter_name, "Unknown User");
        assert_eq!(
            h.coordinator.on_manual_trigger().await,
            BeginOutcome::Started(OperationId(2))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_classification_rejects_and_frees_engine() {
        let h = Setup {
            directory: TestDirectory {
                stalled: Some("classification"),
                ..TestDirectory::civilian()
            },
            ..Default::default()
        }
        .build();

        let started = Instant::now();
        let outcome = h.coordinator.on_manual_trigger().await;
        assert!(matches!(
            outcome,
            BeginOutcome::Rejected(Rejection::ClassificationUnavailable { .. })
        ));
        assert!(started.elapsed() >= Duration::from_secs(8));
        assert_eq!(h.coordinator.state(), OperationState::Idle);
        assert_eq!(h.directory.contact_calls.load(Ordering::SeqCst), 0);

        // a later trigger is refused the same way instead of returning Busy
        assert!(matches!(
            h.coordinator.on_manual_trigger().await,
            BeginOutcome::Rejected(Rejection::ClassificationUnavailable { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_contacts_reject_as_no_contacts() {
        let h = Setup {
            directory: TestDirectory {
                stalled: Some("primary_contacts"),
                ..TestDirectory::civilian()
            },
            ..Default::default()
        }
        .build();

        assert_eq!(
            h.coordinator.on_manual_trigger().await,
            BeginOutcome::Rejected(Rejection::NoContacts)
        );
        assert_eq!(h.coordinator.state(), OperationState::Idle);
        assert_eq!(h.coordinator.active_operation(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_begin_while_dispatching_is_busy() {
        let mut h = Setup {
            position: TestPosition {
                delay: Duration::ZERO,
                hang: true,
            },
            ..Default::default()
        }
        .build();

        h.coordinator.on_manual_trigger().await;
        sleep(Duration::from_secs(7)).await;
        assert_eq!(h.coordinator.state(), OperationState::Dispatching);
        assert_eq!(h.coordinator.on_manual_trigger().await, BeginOutcome::Busy);
        assert_eq!(h.coordinator.cancel(), None);

        assert!(h.outcomes.recv().await.unwrap().is_delivered());
        assert_eq!(h.dispatched(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delivery_surfaces_first_error() {
        let mut h = Setup {
            mode: DispatchMode::Reject,
            ..Default::default()
        }
        .build();

        let BeginOutcome::Started(id) = h.coordinator.on_manual_trigger().await else {
            panic!("expected start");
        };
        assert_eq!(
            h.outcomes.recv().await.unwrap(),
            AlertOutcome::Failed {
                operation_id: id,
                message: "no push token for Mom".into()
            }
        );
        assert!(h
            .hooks
            .states
            .lock()
            .unwrap()
            .contains(&OperationState::Completed));
        assert_eq!(h.coordinator.state(), OperationState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_channel_fails() {
        let mut h = Setup {
            mode: DispatchMode::Unreachable,
            ..Default::default()
        }
        .build();

        h.coordinator.on_manual_trigger().await;
        let AlertOutcome::Failed { message, .. } = h.outcomes.recv().await.unwrap() else {
            panic!("expected failure");
        };
        assert!(message.contains("gateway unreachable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_during_dispatch_resets() {
        let mut h = Setup {
            mode: DispatchMode::Panic,
            ..Default::default()
        }
        .build();

        h.coordinator.on_manual_trigger().await;
        let outcome = h.outcomes.recv().await.unwrap();
        assert!(matches!(outcome, AlertOutcome::Failed { .. }));
        assert_eq!(h.coordinator.state(), OperationState::Idle);
        assert_eq!(h.coordinator.active_operation(), None);

        // engine is usable again
        assert!(matches!(
            h.coordinator.on_manual_trigger().await,
            BeginOutcome::Started(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_failure_does_not_block_alert() {
        let mut h = Setup {
            failing_reports: true,
            ..Default::default()
        }
        .build();

        h.coordinator.on_manual_trigger().await;
        assert!(h.outcomes.recv().await.unwrap().is_delivered());

        sleep(Duration::from_millis(10)).await;
        assert_eq!(h.reports.submitted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_profile_uses_fallback_identity() {
        let mut h = Setup {
            directory: TestDirectory {
                profile: Mutex::new(None),
                ..TestDirectory::civilian()
            },
            ..Default::default()
        }
        .build();

        h.coordinator.on_manual_trigger().await;
        h.outcomes.recv().await.unwrap();
        let sent = h.dispatcher.sent.lock().unwrap().clone();
        assert_eq!(sent[0].reporter_name, "Unknown User");
    }
}
