//! End-to-end leadership lifecycle scenarios.
//!
//! Drives a full service with stub collaborators under paused time and
//! asserts the observable effect order of elections, preparations, defeats,
//! driver exits, and shutdown.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tokio_util::sync::CancellationToken;

use fleethelm::{
    AbdicationHook, AppDefinition, AppId, Candidacy, Candidate, Collaborators, Config, Driver,
    DriverFactory, DriverRef, ElectionListener, Event, EventKind, LeadershipCallback,
    LeadershipCoordinator, Migration, AppRepository, SchedulerCommand, SchedulerHandle,
    SchedulerService, TaskTracker,
};

type EffectLog = Arc<StdMutex<Vec<String>>>;

fn record(log: &EffectLog, effect: &str) {
    log.lock().unwrap().push(effect.to_string());
}

fn effects(log: &EffectLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn clear_effects(log: &EffectLog) {
    log.lock().unwrap().clear();
}

/// Yields repeatedly so spawned tasks run between assertions.
async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

fn drain_commands(rx: &mut mpsc::Receiver<SchedulerCommand>) -> Vec<SchedulerCommand> {
    let mut out = Vec::new();
    while let Ok(cmd) = rx.try_recv() {
        out.push(cmd);
    }
    out
}

fn kinds(events: &[Event]) -> Vec<EventKind> {
    events.iter().map(|e| e.kind).collect()
}

// ---------------------------
// Stub collaborators
// ---------------------------

struct TestDriver {
    log: EffectLog,
    stop_token: CancellationToken,
    crash_token: CancellationToken,
    failover: AtomicBool,
    instant_exit: bool,
}

impl TestDriver {
    fn new(log: EffectLog, instant_exit: bool) -> Self {
        Self {
            log,
            stop_token: CancellationToken::new(),
            crash_token: CancellationToken::new(),
            failover: AtomicBool::new(false),
            instant_exit,
        }
    }

    fn crash(&self) {
        self.crash_token.cancel();
    }

    fn stopped_with_failover(&self) -> bool {
        self.failover.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for TestDriver {
    async fn run(&self) -> anyhow::Result<()> {
        if self.instant_exit {
            return Ok(());
        }
        tokio::select! {
            _ = self.stop_token.cancelled() => Ok(()),
            _ = self.crash_token.cancelled() => Err(anyhow::anyhow!("offer stream failed")),
        }
    }

    async fn stop(&self, failover: bool) {
        record(&self.log, "driver_stop");
        self.failover.store(failover, Ordering::SeqCst);
        self.stop_token.cancel();
    }
}

struct TestFactory {
    log: EffectLog,
    drivers: StdMutex<Vec<Arc<TestDriver>>>,
    instant_exit: AtomicBool,
}

impl TestFactory {
    fn new(log: EffectLog) -> Self {
        Self {
            log,
            drivers: StdMutex::new(Vec::new()),
            instant_exit: AtomicBool::new(false),
        }
    }

    /// Built drivers return from `run()` at once instead of blocking.
    fn make_instant(&self) {
        self.instant_exit.store(true, Ordering::SeqCst);
    }

    fn created(&self) -> usize {
        self.drivers.lock().unwrap().len()
    }

    fn last(&self) -> Arc<TestDriver> {
        self.drivers.lock().unwrap().last().cloned().expect("no driver constructed")
    }
}

#[async_trait]
impl DriverFactory for TestFactory {
    async fn create_driver(&self) -> anyhow::Result<DriverRef> {
        let driver = Arc::new(TestDriver::new(
            self.log.clone(),
            self.instant_exit.load(Ordering::SeqCst),
        ));
        record(&self.log, "driver_create");
        self.drivers.lock().unwrap().push(driver.clone());
        Ok(driver)
    }
}

struct TestMigration {
    log: EffectLog,
    delay: StdMutex<Duration>,
    failures_left: AtomicUsize,
}

impl TestMigration {
    fn new(log: EffectLog) -> Self {
        Self {
            log,
            delay: StdMutex::new(Duration::ZERO),
            failures_left: AtomicUsize::new(0),
        }
    }

    fn fail_next(&self, times: usize) {
        self.failures_left.store(times, Ordering::SeqCst);
    }

    fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl Migration for TestMigration {
    async fn migrate(&self) -> anyhow::Result<()> {
        let delay = *self.delay.lock().unwrap();
        if delay > Duration::ZERO {
            time::sleep(delay).await;
        }
        record(&self.log, "migrate");
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            anyhow::bail!("schema migration failed");
        }
        Ok(())
    }
}

struct TestCoordinator {
    log: EffectLog,
}

#[async_trait]
impl LeadershipCoordinator for TestCoordinator {
    async fn prepare_for_start(&self) -> anyhow::Result<()> {
        record(&self.log, "coord_prepare");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        record(&self.log, "coord_stop");
        Ok(())
    }
}

struct TestCallback {
    log: EffectLog,
}

#[async_trait]
impl LeadershipCallback for TestCallback {
    async fn on_elected(&self) -> anyhow::Result<()> {
        record(&self.log, "cb_elected");
        Ok(())
    }

    async fn on_defeated(&self) -> anyhow::Result<()> {
        record(&self.log, "cb_defeated");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "test-callback"
    }
}

struct TestTracker {
    log: EffectLog,
}

#[async_trait]
impl TaskTracker for TestTracker {
    async fn clear(&self) -> anyhow::Result<()> {
        record(&self.log, "tracker_clear");
        Ok(())
    }

    async fn expunge_orphaned_tasks(&self) -> anyhow::Result<()> {
        record(&self.log, "tracker_expunge");
        Ok(())
    }
}

struct TestApps;

#[async_trait]
impl AppRepository for TestApps {
    async fn get_app(
        &self,
        id: &AppId,
        _version: Option<&str>,
    ) -> anyhow::Result<Option<AppDefinition>> {
        Ok(Some(AppDefinition {
            id: id.clone(),
            version: "2026-08-02T00:00:00Z".to_string(),
            instances: 1,
        }))
    }

    async fn list_app_versions(&self, _id: &AppId) -> anyhow::Result<Vec<String>> {
        Ok(vec!["2026-08-02T00:00:00Z".to_string()])
    }
}

/// Coordination-service stand-in: records the registered listener and lets
/// tests deliver `on_elected` / `on_defeated` the way the service would —
/// from its own task, serialized per epoch.
struct TestCandidate {
    listener: StdMutex<Option<Arc<dyn ElectionListener>>>,
    offers: AtomicUsize,
    hook_fired: Arc<AtomicUsize>,
}

impl TestCandidate {
    fn new() -> Self {
        Self {
            listener: StdMutex::new(None),
            offers: AtomicUsize::new(0),
            hook_fired: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn listener(&self) -> Arc<dyn ElectionListener> {
        self.listener.lock().unwrap().clone().expect("no listener registered")
    }

    fn offers(&self) -> usize {
        self.offers.load(Ordering::SeqCst)
    }

    fn hook_fired(&self) -> usize {
        self.hook_fired.load(Ordering::SeqCst)
    }

    /// Elects the registered listener, handing it an abdication hook that
    /// reports defeat back through the listener, as the real service does.
    async fn elect(&self) {
        let listener = self.listener();
        let fired = Arc::clone(&self.hook_fired);
        let defeated = listener.clone();
        let hook = AbdicationHook::new(move || {
            let fired = Arc::clone(&fired);
            let listener = defeated.clone();
            Box::pin(async move {
                fired.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move { listener.on_defeated().await });
            })
        });
        listener.on_elected(Some(hook)).await;
    }

    /// Delivers a defeat without an abdication (another replica won).
    async fn defeat(&self) {
        self.listener().on_defeated().await;
    }
}

#[async_trait]
impl Candidate for TestCandidate {
    async fn offer_leadership(&self, listener: Arc<dyn ElectionListener>) -> anyhow::Result<()> {
        self.offers.fetch_add(1, Ordering::SeqCst);
        *self.listener.lock().unwrap() = Some(listener);
        Ok(())
    }
}

// ---------------------------
// Harness
// ---------------------------

struct Harness {
    service: Arc<SchedulerService>,
    candidate: Arc<TestCandidate>,
    factory: Arc<TestFactory>,
    migration: Arc<TestMigration>,
    commands: mpsc::Receiver<SchedulerCommand>,
    events: broadcast::Receiver<Event>,
    log: EffectLog,
}

fn test_config() -> Config {
    Config {
        coordination_timeout: Duration::from_secs(5),
        on_elected_prepare_timeout: Duration::from_secs(5),
        max_actor_startup_time: Duration::from_secs(5),
        reconciliation_initial_delay: Duration::from_secs(2),
        reconciliation_interval: Duration::from_secs(10),
        scale_apps_initial_delay: Duration::from_secs(1),
        scale_apps_interval: Duration::from_secs(5),
        bus_capacity: 1024,
        grace: Duration::from_secs(3),
    }
}

fn build(ha: bool, cfg: Config) -> Harness {
    let log: EffectLog = Arc::new(StdMutex::new(Vec::new()));
    let candidate = Arc::new(TestCandidate::new());
    let factory = Arc::new(TestFactory::new(log.clone()));
    let migration = Arc::new(TestMigration::new(log.clone()));
    let (scheduler, commands) = SchedulerHandle::channel(256);

    let candidacy = if ha {
        Candidacy::ha(candidate.clone())
    } else {
        Candidacy::solo()
    };

    let service = Arc::new(SchedulerService::new(
        cfg,
        candidacy,
        Collaborators {
            driver_factory: factory.clone(),
            migration: migration.clone(),
            coordinator: Arc::new(TestCoordinator { log: log.clone() }),
            callbacks: vec![Arc::new(TestCallback { log: log.clone() })],
            task_tracker: Arc::new(TestTracker { log: log.clone() }),
            app_repository: Arc::new(TestApps),
            scheduler,
        },
    ));
    let events = service.subscribe();

    Harness {
        service,
        candidate,
        factory,
        migration,
        commands,
        events,
        log,
    }
}

fn spawn_run(service: &Arc<SchedulerService>) -> tokio::task::JoinHandle<()> {
    let service = Arc::clone(service);
    tokio::spawn(async move { service.run().await })
}

/// Runs an HA harness up to an active epoch: offer at 500ms, then election.
async fn run_to_active(h: &mut Harness) -> tokio::task::JoinHandle<()> {
    let run = spawn_run(&h.service);
    settle().await;
    time::advance(Duration::from_millis(500)).await;
    settle().await;
    assert_eq!(h.candidate.offers(), 1, "offer should fire after initial backoff");

    h.candidate.elect().await;
    settle().await;
    assert!(h.service.leader().is_leader(), "replica should be active");
    run
}

// ---------------------------
// Scenarios
// ---------------------------

#[tokio::test(start_paused = true)]
async fn solo_cold_start_elects_after_initial_backoff() {
    let mut h = build(false, test_config());
    let run = spawn_run(&h.service);
    settle().await;

    // Nothing happens before the initial 500ms backoff elapses.
    time::advance(Duration::from_millis(499)).await;
    settle().await;
    assert_eq!(h.factory.created(), 0);
    assert!(!h.service.leader().is_leader());

    time::advance(Duration::from_millis(1)).await;
    settle().await;
    assert_eq!(h.factory.created(), 1, "self-election constructs a driver");
    assert!(h.service.leader().is_leader());
    let seen = kinds(&drain_events(&mut h.events));
    assert!(seen.contains(&EventKind::ElectedAsLeader));

    // Shutdown: driver stopped with failover, run returns, flag cleared.
    time::advance(Duration::from_millis(1500)).await;
    h.service.trigger_shutdown().await;
    run.await.unwrap();
    assert!(h.factory.last().stopped_with_failover());
    assert!(!h.service.leader().is_leader());

    // Repeated shutdown is a no-op.
    h.service.trigger_shutdown().await;
    let seen = kinds(&drain_events(&mut h.events));
    assert_eq!(
        seen.iter().filter(|k| **k == EventKind::ShutdownRequested).count(),
        1,
        "latch must be released exactly once"
    );
}

#[tokio::test(start_paused = true)]
async fn ha_win_prepares_in_order_and_activates() {
    let mut h = build(true, test_config());
    h.migration.set_delay(Duration::from_millis(300));
    let run = spawn_run(&h.service);
    settle().await;

    time::advance(Duration::from_millis(500)).await;
    settle().await;
    assert_eq!(h.candidate.offers(), 1);

    h.candidate.elect().await;
    settle().await;

    assert!(h.service.leader().is_leader());
    let seq = effects(&h.log);
    assert_eq!(
        seq,
        vec!["migrate", "cb_elected", "coord_prepare", "driver_create"],
        "preparation must run in strict order"
    );

    let seen = kinds(&drain_events(&mut h.events));
    assert_eq!(
        seen.iter().filter(|k| **k == EventKind::ElectedAsLeader).count(),
        1,
        "elected event must be published exactly once"
    );
    let driver_started = seen.iter().position(|k| *k == EventKind::DriverStarted).unwrap();
    let elected = seen.iter().position(|k| *k == EventKind::ElectedAsLeader).unwrap();
    assert!(driver_started < elected, "driver starts before the elected event");

    // Ticker fires only after activation: scale at +1s, reconcile at +2s.
    time::advance(Duration::from_secs(1)).await;
    settle().await;
    assert!(matches!(h.commands.try_recv(), Ok(SchedulerCommand::ScaleApps)));
    time::advance(Duration::from_secs(1)).await;
    settle().await;
    assert!(matches!(h.commands.try_recv(), Ok(SchedulerCommand::ReconcileTasks)));
    assert!(matches!(h.commands.try_recv(), Ok(SchedulerCommand::ReconcileHealthChecks)));

    h.service.trigger_shutdown().await;
    run.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn preparation_failure_backs_off_and_relinquishes() {
    let mut h = build(true, test_config());
    h.migration.fail_next(1);
    let run = spawn_run(&h.service);
    settle().await;

    time::advance(Duration::from_millis(500)).await;
    settle().await;
    h.candidate.elect().await;
    settle().await;

    assert_eq!(h.factory.created(), 0, "no driver is constructed on failure");
    assert!(!h.service.leader().is_leader());
    assert_eq!(h.candidate.hook_fired(), 1, "failure path must run the hook");

    let events = drain_events(&mut h.events);
    let seen = kinds(&events);
    assert!(!seen.contains(&EventKind::ElectedAsLeader));
    assert!(seen.contains(&EventKind::PreparationFailed));
    assert!(seen.contains(&EventKind::Standby));

    // Backoff doubled: the re-offer is scheduled 1s out.
    let delays: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::OfferScheduled)
        .filter_map(|e| e.delay)
        .collect();
    assert_eq!(delays.last(), Some(&Duration::from_secs(1)));

    time::advance(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(h.candidate.offers(), 2, "candidacy is re-offered after backoff");

    h.service.trigger_shutdown().await;
    run.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn defeat_tears_down_in_order() {
    let mut h = build(true, test_config());
    let run = run_to_active(&mut h).await;
    clear_effects(&h.log);
    drain_events(&mut h.events);
    drain_commands(&mut h.commands);

    h.candidate.defeat().await;
    settle().await;

    assert!(!h.service.leader().is_leader());
    let seq = effects(&h.log);
    let pos = |name: &str| {
        seq.iter()
            .position(|e| e == name)
            .unwrap_or_else(|| panic!("missing effect {name} in {seq:?}"))
    };
    assert!(pos("driver_stop") < pos("tracker_clear"));
    assert!(pos("tracker_clear") < pos("cb_defeated"));
    assert!(pos("cb_defeated") < pos("coord_stop"));

    let seen = kinds(&drain_events(&mut h.events));
    assert!(seen.contains(&EventKind::Standby));

    // The defeated epoch's ticker never fires again.
    time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert!(drain_commands(&mut h.commands).is_empty(), "no work after defeat");

    h.service.trigger_shutdown().await;
    run.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn driver_crash_relinquishes_and_reoffers_without_backoff_increase() {
    let mut h = build(true, test_config());
    let run = run_to_active(&mut h).await;
    drain_events(&mut h.events);
    let first_driver = h.factory.last();

    first_driver.crash();
    settle().await;

    assert_eq!(h.candidate.hook_fired(), 1, "driver exit must run the hook");
    assert!(!h.service.leader().is_leader());

    let events = drain_events(&mut h.events);
    let exited = events
        .iter()
        .find(|e| e.kind == EventKind::DriverExited)
        .expect("driver exit event");
    assert!(exited.error.is_some(), "crash is surfaced on the event");

    // Activation succeeded, so the crash does not increase backoff.
    let delays: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::OfferScheduled)
        .filter_map(|e| e.delay)
        .collect();
    assert_eq!(delays.last(), Some(&Duration::from_millis(500)));

    // The next epoch constructs a fresh driver; the old one is never reused.
    time::advance(Duration::from_millis(500)).await;
    settle().await;
    assert_eq!(h.candidate.offers(), 2);
    h.candidate.elect().await;
    settle().await;
    assert_eq!(h.factory.created(), 2, "a new driver per activation");
    assert!(!Arc::ptr_eq(&first_driver, &h.factory.last()));

    h.service.trigger_shutdown().await;
    run.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn instantly_exiting_driver_defeats_against_active() {
    let mut h = build(true, test_config());
    h.factory.make_instant();
    let run = spawn_run(&h.service);
    settle().await;

    time::advance(Duration::from_millis(500)).await;
    settle().await;
    h.candidate.elect().await;
    settle().await;

    // The exit lands against a fully Active epoch: the hook runs, the
    // defeat clears the flag, and nothing is left wedged.
    assert_eq!(h.candidate.hook_fired(), 1);
    assert!(!h.service.leader().is_leader());
    let seen = kinds(&drain_events(&mut h.events));
    assert!(seen.contains(&EventKind::ElectedAsLeader));
    assert!(seen.contains(&EventKind::DriverExited));
    assert!(seen.contains(&EventKind::Standby));

    // The defeated epoch's ticker stays silent and the replica re-offers.
    drain_commands(&mut h.commands);
    time::advance(Duration::from_millis(500)).await;
    settle().await;
    assert_eq!(h.candidate.offers(), 2);
    time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert!(drain_commands(&mut h.commands).is_empty());

    h.service.trigger_shutdown().await;
    run.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn backoff_walks_the_ceiling_on_repeated_failures() {
    let mut h = build(true, test_config());
    h.migration.fail_next(6);
    let run = spawn_run(&h.service);
    settle().await;

    time::advance(Duration::from_millis(500)).await;
    settle().await;

    for _ in 0..6 {
        h.candidate.elect().await;
        settle().await;
    }

    let delays: Vec<_> = drain_events(&mut h.events)
        .iter()
        .filter(|e| e.kind == EventKind::OfferScheduled)
        .filter_map(|e| e.delay)
        .collect();
    let secs: Vec<_> = delays.iter().map(Duration::as_secs_f64).collect();
    assert_eq!(
        secs,
        vec![0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0],
        "doubling with one step past the inclusive ceiling"
    );

    // One success resets to the initial delay.
    h.service.trigger_shutdown().await;
    run.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn success_resets_backoff_to_initial() {
    let mut h = build(true, test_config());
    h.migration.fail_next(1);
    let run = spawn_run(&h.service);
    settle().await;

    time::advance(Duration::from_millis(500)).await;
    settle().await;
    h.candidate.elect().await;
    settle().await;

    // Second election succeeds; activation resets the backoff.
    h.candidate.elect().await;
    settle().await;
    assert!(h.service.leader().is_leader());
    drain_events(&mut h.events);

    h.candidate.defeat().await;
    settle().await;

    let delays: Vec<_> = drain_events(&mut h.events)
        .iter()
        .filter(|e| e.kind == EventKind::OfferScheduled)
        .filter_map(|e| e.delay)
        .collect();
    assert_eq!(delays.last(), Some(&Duration::from_millis(500)));

    h.service.trigger_shutdown().await;
    run.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_preparation_stops_the_fresh_driver() {
    let mut h = build(true, test_config());
    h.migration.set_delay(Duration::from_millis(300));
    let run = spawn_run(&h.service);
    settle().await;

    time::advance(Duration::from_millis(500)).await;
    settle().await;

    // Election in flight while shutdown triggers.
    let candidate = h.candidate.clone();
    let elect = tokio::spawn(async move { candidate.elect().await });
    settle().await;
    h.service.trigger_shutdown().await;

    time::advance(Duration::from_millis(300)).await;
    elect.await.unwrap();
    settle().await;

    // The transient elected-then-standby sequence is tolerated.
    let seen = kinds(&drain_events(&mut h.events));
    let elected = seen.iter().position(|k| *k == EventKind::ElectedAsLeader);
    let standby = seen.iter().position(|k| *k == EventKind::Standby);
    assert!(elected.is_some() && standby.is_some());
    assert!(elected < standby);

    assert!(!h.service.leader().is_leader());
    assert!(h.factory.last().stopped_with_failover());
    run.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn peer_surface_routes_through_the_actor() {
    let mut h = build(true, test_config());

    let echoed = h.service.kill_tasks(
        AppId::new("/infra/redis"),
        vec![fleethelm::TaskId::new("t-1"), fleethelm::TaskId::new("t-2")],
    );
    assert_eq!(echoed.len(), 2);
    h.service.cancel_deployment("d-9");

    let cmds = drain_commands(&mut h.commands);
    assert!(matches!(cmds[0], SchedulerCommand::KillTasks { ref tasks, .. } if tasks.len() == 2));
    assert!(matches!(cmds[1], SchedulerCommand::CancelDeployment { ref id } if id == "d-9"));

    let app = h
        .service
        .get_app(&AppId::new("/infra/redis"), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(app.id, AppId::new("/infra/redis"));

    // With no actor consuming commands, listing times out after the
    // coordination timeout instead of hanging.
    let err = h.service.list_running_deployments().await.unwrap_err();
    assert!(matches!(err, fleethelm::ServiceError::Timeout { .. }));
}
