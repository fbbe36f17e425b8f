//! # LeaderCore: the leadership state machine.
//!
//! The central controller of the replica: offers candidacy, reacts to
//! `on_elected` / `on_defeated` callbacks from the coordination service,
//! sequences the elected preparation, owns the driver supervisor and the
//! per-epoch ticker, and enforces the shutdown barrier.
//!
//! ## States
//! ```text
//!        run                 elected              prepared
//! Idle ──────► Offering ──────────────► Preparing ─────────► Active
//!   ▲              ▲                        │                  │
//!   │              │   prep failed:         │    defeated /    │
//!   │              └── backoff↑, hook ◄─────┘    driver exit   │
//!   │                                                          ▼
//!   └───────────────────── Defeating ◄─────────────────────────┘
//!
//! any state ── trigger_shutdown ──► Stopped (latch released once)
//! ```
//!
//! ## Elected preparation (strict order, each step bounded)
//! 1. data migration (`coordination_timeout`)
//! 2. `on_elected` leadership callbacks (`on_elected_prepare_timeout`)
//! 3. leadership coordinator prepare (`max_actor_startup_time`)
//! 4. fresh driver from the factory
//! 5. activate: flag, driver worker, `ElectedAsLeader`, ticker, backoff reset
//!
//! ## Rules
//! - No error on the critical path recovers leadership in place: every
//!   failure increases backoff, abdicates, and re-offers.
//! - The abdication hook is owned by exactly one path per epoch: the
//!   driver-exit handler once the driver is launched, the failure path
//!   before that.
//! - Candidacy offers are accepted only from `Idle`, so the racing re-offer
//!   paths (driver exit, defeat, failure recovery) collapse into a single
//!   registration.
//! - The state reaches `Active` before the driver worker is spawned, so
//!   even an instantly-exiting driver delivers its defeat against `Active`,
//!   never into a half-finished activation.
//! - State critical sections never span an await; long-running actions run
//!   after the guard is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::future;
use tokio::sync::Mutex;
use tokio::time::{self, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::actor::SchedulerHandle;
use crate::collaborators::{LeadershipCallback, LeadershipCoordinator, Migration, TaskTracker};
use crate::config::Config;
use crate::core::flag::{LeaderFlag, LeaderView};
use crate::core::service::Collaborators;
use crate::core::supervisor::DriverSupervisor;
use crate::core::ticker::EpochTicker;
use crate::driver::{DriverFactory, DriverRef};
use crate::election::{AbdicationHook, Candidacy, ElectionListener};
use crate::error::LeadershipError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::OfferBackoff;

/// Position of the replica in the leadership lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaderState {
    Idle,
    Offering,
    Preparing,
    Active,
    Defeating,
    Stopped,
}

/// The leadership state machine.
///
/// Created once per process by the service shell; shared with the offer
/// scheduler, the driver worker, and the coordination-service callbacks.
pub(crate) struct LeaderCore {
    cfg: Config,
    bus: Bus,
    me: Weak<LeaderCore>,
    flag: LeaderFlag,
    state: Mutex<LeaderState>,
    backoff: Mutex<OfferBackoff>,
    candidacy: Candidacy,
    factory: Arc<dyn DriverFactory>,
    migration: Arc<dyn Migration>,
    coordinator: Arc<dyn LeadershipCoordinator>,
    callbacks: Vec<Arc<dyn LeadershipCallback>>,
    tracker: Arc<dyn TaskTracker>,
    scheduler: SchedulerHandle,
    supervisor: DriverSupervisor,
    ticker: Mutex<Option<EpochTicker>>,
    shutdown: CancellationToken,
    shutdown_once: AtomicBool,
}

impl LeaderCore {
    pub(crate) fn new(
        cfg: Config,
        bus: Bus,
        candidacy: Candidacy,
        collaborators: &Collaborators,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            supervisor: DriverSupervisor::new(bus.clone()),
            backoff: Mutex::new(OfferBackoff::default()),
            state: Mutex::new(LeaderState::Idle),
            flag: LeaderFlag::new(),
            me: me.clone(),
            candidacy,
            factory: Arc::clone(&collaborators.driver_factory),
            migration: Arc::clone(&collaborators.migration),
            coordinator: Arc::clone(&collaborators.coordinator),
            callbacks: collaborators.callbacks.clone(),
            tracker: Arc::clone(&collaborators.task_tracker),
            scheduler: collaborators.scheduler.clone(),
            ticker: Mutex::new(None),
            shutdown: CancellationToken::new(),
            shutdown_once: AtomicBool::new(false),
            cfg,
            bus,
        })
    }

    /// Read-only leader flag for peripheral consumers.
    pub(crate) fn leader_view(&self) -> LeaderView {
        self.flag.view()
    }

    /// True until `trigger_shutdown` has run.
    pub(crate) fn is_running(&self) -> bool {
        !self.shutdown_once.load(Ordering::SeqCst)
    }

    /// Resolves when the shutdown latch is released.
    pub(crate) async fn await_shutdown(&self) {
        self.shutdown.cancelled().await;
    }

    /// Schedules a candidacy offer after the current backoff delay.
    ///
    /// Accepted only from `Idle`; every other state either already holds an
    /// offer in flight or forbids one, so racing callers collapse here.
    /// Offer failures increase the backoff and retry inside the same task,
    /// keeping the replica in `Offering`.
    pub(crate) async fn offer_candidacy(&self) {
        if !self.is_running() {
            return;
        }
        {
            let mut state = self.state.lock().await;
            if *state != LeaderState::Idle {
                return;
            }
            *state = LeaderState::Offering;
        }

        let Some(me) = self.me.upgrade() else { return };
        let mut delay = self.backoff.lock().await.delay();
        self.bus
            .publish(Event::new(EventKind::OfferScheduled).with_delay(delay));
        info!(?delay, "scheduling candidacy offer");

        tokio::spawn(async move {
            loop {
                let sleep = time::sleep(delay);
                tokio::pin!(sleep);
                tokio::select! {
                    _ = &mut sleep => {}
                    _ = me.shutdown.cancelled() => return,
                }

                let listener: Arc<dyn ElectionListener> = me.clone();
                match me.candidacy.offer(listener).await {
                    Ok(()) => return,
                    Err(e) => {
                        warn!(error = %e, "candidacy offer failed");
                        {
                            let mut backoff = me.backoff.lock().await;
                            backoff.increase();
                            delay = backoff.delay();
                        }
                        me.bus
                            .publish(Event::new(EventKind::OfferScheduled).with_delay(delay));
                    }
                }
            }
        });
    }

    /// Runs the bounded preparation sequence and returns the fresh driver.
    async fn prepare(&self) -> Result<DriverRef, LeadershipError> {
        debug!("running data migration");
        match timeout(self.cfg.coordination_timeout, self.migration.migrate()).await {
            Err(_) => {
                return Err(LeadershipError::Migration {
                    source: anyhow::anyhow!(
                        "timed out after {:?}",
                        self.cfg.coordination_timeout
                    ),
                });
            }
            Ok(Err(e)) => return Err(LeadershipError::Migration { source: e }),
            Ok(Ok(())) => {}
        }

        debug!(count = self.callbacks.len(), "running on_elected callbacks");
        let elected = self.callbacks.iter().map(|cb| {
            let cb = Arc::clone(cb);
            async move {
                let name = cb.name();
                cb.on_elected().await.map_err(|e| e.context(name))
            }
        });
        match timeout(
            self.cfg.on_elected_prepare_timeout,
            future::try_join_all(elected),
        )
        .await
        {
            Err(_) => {
                return Err(LeadershipError::CallbackTimeout {
                    timeout: self.cfg.on_elected_prepare_timeout,
                });
            }
            Ok(Err(e)) => return Err(LeadershipError::Callback { source: e }),
            Ok(Ok(_)) => {}
        }

        debug!("preparing leadership coordinator");
        match timeout(
            self.cfg.max_actor_startup_time,
            self.coordinator.prepare_for_start(),
        )
        .await
        {
            Err(_) => {
                return Err(LeadershipError::CoordinatorTimeout {
                    timeout: self.cfg.max_actor_startup_time,
                });
            }
            Ok(Err(e)) => return Err(LeadershipError::Coordinator { source: e }),
            Ok(Ok(())) => {}
        }

        debug!("constructing fresh driver");
        self.factory
            .create_driver()
            .await
            .map_err(|e| LeadershipError::DriverCreation { source: e })
    }

    /// Step 5 of preparation: make this epoch live.
    ///
    /// The driver is installed and the state set to `Active` before the
    /// worker is spawned: a driver that exits immediately then delivers its
    /// defeat against `Active`, never against a half-finished activation.
    /// Once the worker runs, the abdication hook belongs to the driver-exit
    /// handler.
    async fn activate(&self, driver: DriverRef, hook: Option<AbdicationHook>) {
        self.flag.store(true);
        self.supervisor.install(driver).await;
        {
            let mut state = self.state.lock().await;
            if *state == LeaderState::Preparing {
                *state = LeaderState::Active;
            }
        }
        self.supervisor.spawn_worker(hook, self.me.clone()).await;

        self.bus.publish(Event::new(EventKind::ElectedAsLeader));
        info!("activated as leader");

        let ticker = EpochTicker::start(
            &self.cfg,
            self.flag.view(),
            self.scheduler.clone(),
            Arc::clone(&self.tracker),
        );
        {
            // Arm only while the epoch is still alive; a defeat that raced
            // the activation already owns the teardown.
            let state = self.state.lock().await;
            if *state == LeaderState::Active {
                *self.ticker.lock().await = Some(ticker);
            } else {
                debug!("epoch ended during activation, not arming ticker");
                ticker.cancel();
            }
        }
        self.backoff.lock().await.reset();

        if !self.is_running() {
            // Shutdown raced the preparation: the elected publication stands,
            // and the freshly started epoch is torn down right away.
            warn!("shutdown raced preparation, stopping fresh driver");
            if let Some(ticker) = self.ticker.lock().await.take() {
                ticker.cancel();
            }
            self.supervisor.stop(self.cfg.grace).await;
            self.flag.store(false);
            self.bus.publish(Event::new(EventKind::Standby));
        }
    }

    /// Failure branch of the elected preparation.
    ///
    /// The driver never took ownership of the hook here, so the state
    /// machine executes it itself before re-offering.
    async fn fail_preparation(&self, err: LeadershipError, hook: Option<AbdicationHook>) {
        error!(label = err.as_label(), error = %err, "elected preparation failed, abdicating");
        self.bus
            .publish(Event::new(EventKind::PreparationFailed).with_error(err.to_string()));

        self.backoff.lock().await.increase();
        self.defeat_leadership().await;

        if let Some(hook) = hook {
            hook.execute().await;
        }
        self.offer_candidacy().await;
    }

    /// The defeat transition shared by `on_defeated`, the preparation
    /// failure path, and the solo driver-exit path.
    ///
    /// Order: ticker, driver, task tracker, `on_defeated` callbacks and
    /// coordinator drain, leader flag, `Standby`.
    pub(crate) async fn defeat_leadership(&self) {
        {
            let mut state = self.state.lock().await;
            if *state == LeaderState::Stopped {
                return;
            }
            *state = LeaderState::Defeating;
        }
        info!("releasing leadership");

        if let Some(ticker) = self.ticker.lock().await.take() {
            ticker.cancel();
        }
        self.supervisor.stop(self.cfg.grace).await;

        match timeout(self.cfg.coordination_timeout, self.tracker.clear()).await {
            Err(_) => warn!("task tracker clear timed out"),
            Ok(Err(e)) => warn!(error = %e, "task tracker clear failed"),
            Ok(Ok(())) => {}
        }

        let defeated = self.callbacks.iter().map(|cb| {
            let cb = Arc::clone(cb);
            async move { (cb.name(), cb.on_defeated().await) }
        });
        match timeout(self.cfg.coordination_timeout, future::join_all(defeated)).await {
            Err(_) => warn!("on_defeated callbacks timed out"),
            Ok(results) => {
                for (name, result) in results {
                    if let Err(e) = result {
                        warn!(callback = name, error = %e, "on_defeated callback failed");
                    }
                }
            }
        }
        match timeout(self.cfg.coordination_timeout, self.coordinator.stop()).await {
            Err(_) => warn!("leadership coordinator stop timed out"),
            Ok(Err(e)) => warn!(error = %e, "leadership coordinator stop failed"),
            Ok(Ok(())) => {}
        }

        self.flag.store(false);
        self.bus.publish(Event::new(EventKind::Standby));

        {
            let mut state = self.state.lock().await;
            if *state != LeaderState::Stopped {
                *state = LeaderState::Idle;
            }
        }
    }

    /// Continuation of the driver worker after `driver.run()` returned.
    ///
    /// With a hook (HA) the exit relinquishes candidacy; the coordination
    /// service answers with `on_defeated`, which runs the defeat transition
    /// and re-offers. Without one (solo) the defeat runs locally, from a
    /// fresh task so the exiting worker can drain.
    pub(crate) async fn handle_driver_exit(&self, hook: Option<AbdicationHook>) {
        match hook {
            Some(hook) => hook.execute().await,
            None => {
                if let Some(me) = self.me.upgrade() {
                    tokio::spawn(async move {
                        me.defeat_leadership().await;
                        me.offer_candidacy().await;
                    });
                }
            }
        }
    }

    /// Idempotent shutdown: flag, driver, ticker, then the latch — released
    /// exactly once. After this no further candidacy offers are made.
    pub(crate) async fn trigger_shutdown(&self) {
        if self.shutdown_once.swap(true, Ordering::SeqCst) {
            debug!("shutdown already triggered");
            return;
        }
        info!("shutdown triggered");
        *self.state.lock().await = LeaderState::Stopped;

        self.flag.store(false);
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.supervisor.stop(self.cfg.grace).await;
        if let Some(ticker) = self.ticker.lock().await.take() {
            ticker.cancel();
        }
        self.shutdown.cancel();
    }
}

#[async_trait::async_trait]
impl ElectionListener for LeaderCore {
    async fn on_elected(&self, hook: Option<AbdicationHook>) {
        enum Gate {
            Proceed,
            Relinquish,
        }
        let gate = {
            let mut state = self.state.lock().await;
            match *state {
                LeaderState::Offering => {
                    *state = LeaderState::Preparing;
                    Gate::Proceed
                }
                _ => Gate::Relinquish,
            }
        };

        match gate {
            Gate::Proceed => {
                info!("elected as leader, preparing");
                match self.prepare().await {
                    Ok(driver) => self.activate(driver, hook).await,
                    Err(e) => self.fail_preparation(e, hook).await,
                }
            }
            Gate::Relinquish => {
                // An election we can no longer honor must still be
                // relinquished, or the service would wait on a dead leader.
                warn!("elected outside of an open offer, relinquishing");
                if let Some(hook) = hook {
                    hook.execute().await;
                }
            }
        }
    }

    async fn on_defeated(&self) {
        let active = { *self.state.lock().await == LeaderState::Active };
        if !active {
            debug!("defeated while not active, ignoring");
            return;
        }
        info!("leadership lost");
        self.defeat_leadership().await;
        self.offer_candidacy().await;
    }
}
