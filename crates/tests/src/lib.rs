//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约与配置快照测试
//! - 摇动检测场景 (A/B)
//! - 协调器端到端场景 (C/D/E)，全部基于 mock_services，无需外部服务

#[cfg(test)]
mod contract_tests {
    use std::path::Path;

    use config_loader::ConfigLoader;
    use contracts::EngineConfig;

    #[test]
    fn test_demo_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/sos-engine.toml");
        let config = ConfigLoader::load_from_path(&path).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_demo_directory_fixture_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/directory.json");
        let data = mock_services::DirectoryData::from_json_file(&path).unwrap();
        assert!(data.classification.is_eligible());
        assert_eq!(data.contacts.iter().filter(|c| c.is_primary).count(), 2);
    }

    #[test]
    fn test_demo_recording_contains_one_sequence() {
        use mock_services::{PlaybackConfig, ReplayMotionSensor};
        use shake_detector::{SampleOutcome, ShakeDetector};

        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/triple_shake.jsonl");
        let sensor = ReplayMotionSensor::load(&path, PlaybackConfig::default()).unwrap();

        let mut detector = ShakeDetector::new(EngineConfig::default().shake);
        let triggers: Vec<u64> = sensor
            .samples()
            .iter()
            .filter(|s| detector.on_sample(s) == SampleOutcome::Triggered)
            .map(|s| s.timestamp_ms)
            .collect();
        assert_eq!(triggers, vec![1300]);
    }
}

#[cfg(test)]
mod shake_tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use contracts::{MotionSample, ShakeConfig};
    use mock_services::MockMotionSensor;
    use shake_detector::{MotionSignalProcessor, SampleOutcome, ShakeDetector};

    fn shake(t_ms: u64) -> MotionSample {
        MotionSample::new(20.0, 0.0, 0.0, t_ms)
    }

    fn processor() -> (MotionSignalProcessor, Arc<AtomicU32>) {
        let sensor = Arc::new(MockMotionSensor::with_samples(
            "scenario",
            Vec::new(),
            Default::default(),
        ));
        let processor = MotionSignalProcessor::new(sensor, ShakeConfig::default());
        let triggers = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&triggers);
        processor.start(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        (processor, triggers)
    }

    /// Scenario A: shakes at 0, 300 and 700 ms trigger at 700 ms
    #[test]
    fn test_scenario_a_triple_shake_triggers() {
        let mut detector = ShakeDetector::new(ShakeConfig::default());
        assert_eq!(detector.on_sample(&shake(0)), SampleOutcome::Counted(1));
        assert_eq!(detector.on_sample(&shake(300)), SampleOutcome::Counted(2));
        assert_eq!(detector.on_sample(&shake(700)), SampleOutcome::Triggered);

        let (processor, triggers) = processor();
        for t in [0, 300, 700] {
            processor.on_sample(shake(t));
        }
        assert_eq!(triggers.load(Ordering::SeqCst), 1);
        assert_eq!(processor.shake_count(), 0);
    }

    /// Scenario B: a pause past the reset window breaks the sequence
    #[test]
    fn test_scenario_b_pause_resets_count() {
        let (processor, triggers) = processor();
        processor.on_sample(shake(0));
        processor.on_sample(shake(300));
        processor.on_sample(MotionSample::new(0.0, 0.0, 9.81, 1_400));
        processor.on_sample(shake(1_800));

        assert_eq!(triggers.load(Ordering::SeqCst), 0);
        assert_eq!(processor.shake_count(), 1);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use contracts::{
        AlertOutcome, BeginOutcome, EngineConfig, FeedbackHooks, OperationId, OperationState,
        Rejection, TriggerSource,
    };
    use coordinator::{Collaborators, Delivery, OperationCoordinator};
    use mock_services::{
        DirectoryFailures, MockBundle, MockMotionSensor, MockServices, PositionBehavior,
        DEFAULT_FIX,
    };
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use shake_detector::MotionSignalProcessor;
    use tokio::sync::mpsc;
    use tokio::time::sleep;

    /// Hooks that keep everything they are told
    #[derive(Default)]
    struct RecordingHooks {
        states: Mutex<Vec<OperationState>>,
        ticks: Mutex<Vec<(OperationId, u32)>>,
        outcomes: Mutex<Vec<AlertOutcome>>,
        outcome_tx: Mutex<Option<mpsc::UnboundedSender<AlertOutcome>>>,
    }

    impl RecordingHooks {
        fn states(&self) -> Vec<OperationState> {
            self.states.lock().unwrap().clone()
        }

        fn outcomes(&self) -> Vec<AlertOutcome> {
            self.outcomes.lock().unwrap().clone()
        }

        fn ticks_for(&self, id: OperationId) -> Vec<u32> {
            self.ticks
                .lock()
                .unwrap()
                .iter()
                .filter(|(op, _)| *op == id)
                .map(|(_, remaining)| *remaining)
                .collect()
        }
    }

    impl FeedbackHooks for RecordingHooks {
        fn on_countdown_tick(&self, operation_id: OperationId, remaining_seconds: u32) {
            self.ticks
                .lock()
                .unwrap()
                .push((operation_id, remaining_seconds));
        }

        fn on_state_change(&self, state: OperationState) {
            self.states.lock().unwrap().push(state);
        }

        fn on_outcome(&self, outcome: &AlertOutcome) {
            self.outcomes.lock().unwrap().push(outcome.clone());
            if let Some(tx) = self.outcome_tx.lock().unwrap().as_ref() {
                let _ = tx.send(outcome.clone());
            }
        }
    }

    struct Engine {
        coordinator: OperationCoordinator<MockServices>,
        hooks: Arc<RecordingHooks>,
        mocks: MockBundle,
    }

    fn engine_with(mocks: MockBundle, config: EngineConfig) -> Engine {
        let hooks = Arc::new(RecordingHooks::default());
        let collaborators = Collaborators::<MockServices> {
            directory: Arc::clone(&mocks.directory),
            position: Arc::clone(&mocks.position),
            geocoder: Arc::clone(&mocks.geocoder),
            dispatcher: Arc::clone(&mocks.dispatcher),
            reports: Arc::clone(&mocks.reports),
        };
        let coordinator =
            OperationCoordinator::new("civ-001".into(), config, collaborators, hooks.clone());
        Engine {
            coordinator,
            hooks,
            mocks,
        }
    }

    fn engine() -> Engine {
        engine_with(MockBundle::healthy(), EngineConfig::default())
    }

    fn started(outcome: BeginOutcome) -> OperationId {
        match outcome {
            BeginOutcome::Started(id) => id,
            other => panic!("expected a countdown, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_delivered_after_countdown() {
        let e = engine();
        let id = started(e.coordinator.on_manual_trigger().await);

        sleep(Duration::from_secs(4)).await;
        assert_eq!(e.mocks.dispatcher.dispatch_count(), 0);

        sleep(Duration::from_secs(2)).await;
        let sent = e.mocks.dispatcher.dispatched();
        assert_eq!(sent.len(), 1);

        let record = &sent[0];
        assert_eq!(record.payload.operation_id, id);
        assert_eq!(record.contacts.len(), 2);
        assert!(record.contacts.iter().all(|c| c.is_primary));
        assert_eq!(record.payload.reporter_name, "Ana Cruz");
        assert_eq!(record.payload.message, "Emergency SOS alert from Ana Cruz");
        assert_eq!(record.payload.location.latitude, DEFAULT_FIX.latitude);
        assert_eq!(record.payload.location.address, "Rizal Park, Ermita, Manila");

        assert_eq!(e.hooks.ticks_for(id), vec![5, 4, 3, 2, 1, 0]);
        let outcome = e.hooks.outcomes().pop().unwrap();
        let delivery = Delivery::try_from(outcome).unwrap();
        assert_eq!(delivery.sent_to, 2);
        assert_eq!(e.coordinator.state(), OperationState::Idle);

        sleep(Duration::from_millis(10)).await;
        let reports = e.mocks.reports.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, "Emergency SOS");
        assert_eq!(reports[0].reporter_name, "Ana Cruz");
    }

    /// Scenario C: a second begin during the countdown cancels it for good
    #[tokio::test(start_paused = true)]
    async fn test_scenario_c_second_begin_cancels() {
        let e = engine();
        e.mocks.position.set_behavior(PositionBehavior::Fix {
            coords: DEFAULT_FIX,
            delay: Duration::from_secs(6),
        });

        let id = started(e.coordinator.on_manual_trigger().await);
        sleep(Duration::from_secs(2)).await;

        assert_eq!(
            e.coordinator.on_manual_trigger().await,
            BeginOutcome::Cancelled(id)
        );
        assert!(e.hooks.states().contains(&OperationState::Cancelled));
        assert_eq!(e.coordinator.active_operation(), None);

        // the abandoned location fetch would have settled at t=6
        sleep(Duration::from_secs(20)).await;
        assert_eq!(e.mocks.dispatcher.dispatch_count(), 0);
        assert!(e.hooks.outcomes().is_empty());
        assert_eq!(e.coordinator.state(), OperationState::Idle);
        assert!(e.hooks.ticks_for(id).iter().all(|r| *r >= 3));
    }

    /// Scenario D: no contacts and no cached list aborts before the countdown
    #[tokio::test(start_paused = true)]
    async fn test_scenario_d_contacts_unavailable() {
        let e = engine();
        e.mocks.directory.set_failures(DirectoryFailures {
            contacts: true,
            ..Default::default()
        });

        let outcome = e.coordinator.on_sensor_trigger().await;
        assert_eq!(outcome, BeginOutcome::Rejected(Rejection::NoContacts));
        assert_eq!(
            e.hooks.outcomes(),
            vec![AlertOutcome::Rejected(Rejection::NoContacts)]
        );
        assert!(e.hooks.ticks.lock().unwrap().is_empty());
        assert_eq!(e.mocks.position.calls(), 0);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(e.mocks.dispatcher.dispatch_count(), 0);
        assert_eq!(e.coordinator.state(), OperationState::Idle);
    }

    /// Scenario E: dispatch waits for a pending location to settle
    #[tokio::test(start_paused = true)]
    async fn test_scenario_e_dispatch_waits_for_location() {
        let e = engine();
        e.mocks.position.set_behavior(PositionBehavior::Hang);

        let id = started(e.coordinator.on_manual_trigger().await);

        sleep(Duration::from_secs(7)).await;
        assert_eq!(e.coordinator.state(), OperationState::Dispatching);
        assert_eq!(e.mocks.dispatcher.dispatch_count(), 0);

        sleep(Duration::from_secs(4)).await;
        let sent = e.mocks.dispatcher.dispatched();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload.operation_id, id);
        assert!(sent[0].payload.location.is_fallback());
        assert!(e.hooks.outcomes()[0].is_delivered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_directory_carries_second_alert() {
        let e = engine();
        started(e.coordinator.on_manual_trigger().await);
        sleep(Duration::from_secs(6)).await;
        assert_eq!(e.mocks.dispatcher.dispatch_count(), 1);

        // contacts past their TTL and the directory now down
        sleep(Duration::from_secs(60)).await;
        e.mocks.directory.set_failures(DirectoryFailures {
            contacts: true,
            profile: true,
            ..Default::default()
        });

        started(e.coordinator.on_manual_trigger().await);
        sleep(Duration::from_secs(6)).await;

        let sent = e.mocks.dispatcher.dispatched();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].contacts.len(), 2);
        assert_eq!(sent[1].payload.reporter_name, "Ana Cruz");
        assert_eq!(e.mocks.directory.classification_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fix_degrades_to_fallback_location() {
        let e = engine();
        e.mocks
            .position
            .set_behavior(PositionBehavior::Fail("permission denied".into()));

        started(e.coordinator.on_sensor_trigger().await);
        sleep(Duration::from_secs(6)).await;

        let sent = e.mocks.dispatcher.dispatched();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].payload.location.is_fallback());
    }

    /// A hung directory with nothing cached refuses the alert within the
    /// lookup bound and leaves the engine free for the next trigger
    #[tokio::test(start_paused = true)]
    async fn test_stalled_directory_refuses_without_locking() {
        let e = engine();
        e.mocks.directory.set_failures(DirectoryFailures {
            stalled: true,
            ..Default::default()
        });

        let begun = tokio::time::Instant::now();
        let outcome = e.coordinator.on_manual_trigger().await;
        assert!(matches!(
            outcome,
            BeginOutcome::Rejected(Rejection::ClassificationUnavailable { .. })
        ));
        assert!(begun.elapsed() >= Duration::from_secs(8));
        assert!(begun.elapsed() < Duration::from_secs(9));
        assert_eq!(e.coordinator.state(), OperationState::Idle);

        e.mocks.directory.set_failures(DirectoryFailures::default());
        started(e.coordinator.on_manual_trigger().await);
        sleep(Duration::from_secs(6)).await;
        assert_eq!(e.mocks.dispatcher.dispatch_count(), 1);
    }

    /// A hung directory behind a warm cache still gets the alert out
    #[tokio::test(start_paused = true)]
    async fn test_stalled_directory_uses_cached_entries() {
        let e = engine();
        started(e.coordinator.on_manual_trigger().await);
        sleep(Duration::from_secs(6)).await;
        assert_eq!(e.mocks.dispatcher.dispatch_count(), 1);

        // every cache entry is past its TTL
        sleep(Duration::from_secs(400)).await;
        e.mocks.directory.set_failures(DirectoryFailures {
            stalled: true,
            ..Default::default()
        });

        let id = started(e.coordinator.on_manual_trigger().await);
        sleep(Duration::from_secs(20)).await;

        let sent = e.mocks.dispatcher.dispatched();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].payload.operation_id, id);
        assert_eq!(sent[1].contacts.len(), 2);
        assert_eq!(sent[1].payload.reporter_name, "Ana Cruz");
        assert_eq!(e.coordinator.state(), OperationState::Idle);
    }

    /// Random begin/cancel interleavings never dispatch a cancelled intent
    /// and dispatch each completed one exactly once
    #[tokio::test(start_paused = true)]
    async fn test_random_interleavings_dispatch_at_most_once() {
        let mut rng = StdRng::seed_from_u64(2024);

        for _ in 0..20 {
            let e = engine();
            let mut cancelled = Vec::new();

            for _ in 0..rng.random_range(1..8) {
                match e.coordinator.begin(TriggerSource::Sensor).await {
                    BeginOutcome::Cancelled(id) => cancelled.push(id),
                    BeginOutcome::Started(_) | BeginOutcome::Busy => {}
                    BeginOutcome::Rejected(r) => panic!("unexpected rejection {r:?}"),
                }
                sleep(Duration::from_millis(rng.random_range(0..7_000))).await;
            }
            sleep(Duration::from_secs(20)).await;

            let sent: Vec<OperationId> = e
                .mocks
                .dispatcher
                .dispatched()
                .iter()
                .map(|r| r.payload.operation_id)
                .collect();
            let mut unique = sent.clone();
            unique.dedup();
            assert_eq!(unique, sent, "an operation was dispatched twice");
            assert!(sent.iter().all(|id| !cancelled.contains(id)));

            let delivered = e
                .hooks
                .outcomes()
                .iter()
                .filter(|o| o.is_delivered())
                .count();
            assert_eq!(delivered, sent.len());
            assert_eq!(e.coordinator.state(), OperationState::Idle);
        }
    }

    /// Mock accelerometer -> shake detector -> coordinator -> dispatcher
    #[tokio::test]
    async fn test_e2e_shake_to_dispatch() {
        let mut config = EngineConfig::default();
        config.countdown.seconds = 2;
        config.countdown.tick_ms = 20;
        let e = engine_with(MockBundle::healthy(), config.clone());

        let (tx, mut rx) = mpsc::unbounded_channel();
        *e.hooks.outcome_tx.lock().unwrap() = Some(tx);

        let sensor = Arc::new(MockMotionSensor::with_defaults("e2e"));
        let processor = MotionSignalProcessor::new(sensor, config.shake);
        let runtime = tokio::runtime::Handle::current();
        let coordinator = e.coordinator.clone();
        processor.start(Arc::new(move || {
            let coordinator = coordinator.clone();
            runtime.spawn(async move {
                coordinator.on_sensor_trigger().await;
            });
        }));

        let outcome = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("no outcome within 10s")
            .unwrap();
        processor.stop();

        assert!(outcome.is_delivered(), "got {outcome:?}");
        assert_eq!(e.mocks.dispatcher.dispatch_count(), 1);
    }
}
