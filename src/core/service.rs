//! # SchedulerService: the long-running service shell.
//!
//! Owns the leader core and the event bus, and exposes the surface consumed
//! by the HTTP API and other peers.
//!
//! ## Lifecycle
//! ```text
//! start_up() ──► run() ──offer candidacy──► [leader core drives epochs]
//!                  │
//!                  └──awaits the shutdown latch──► returns
//!
//! trigger_shutdown() ──► flag↓, driver stopped, ticker cancelled, latch
//!                        released exactly once (idempotent)
//! ```
//!
//! The run caller is the ownership anchor; leadership callbacks arrive on
//! coordination-service tasks and mutate state owned conceptually by the
//! run lifetime. The latch decouples "work available" from "process should
//! exit".
//!
//! ## Rules
//! - `run` does not return until shutdown.
//! - Peer lookups are bounded by `coordination_timeout` and never touch
//!   leadership state.
//! - Every lifecycle event is mirrored to `tracing` by a bus listener; bus
//!   subscribers are observers only.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::actor::{SchedulerCommand, SchedulerHandle};
use crate::collaborators::{
    AppRepository, LeadershipCallback, LeadershipCoordinator, Migration, TaskTracker,
};
use crate::config::Config;
use crate::core::flag::LeaderView;
use crate::core::leader::LeaderCore;
use crate::driver::DriverFactory;
use crate::election::Candidacy;
use crate::error::ServiceError;
use crate::events::{Bus, Event, EventKind};
use crate::model::{AppDefinition, AppId, DeploymentPlan, TaskId};

/// External collaborators wired into the service at construction.
pub struct Collaborators {
    /// Builds one fresh driver per activation.
    pub driver_factory: Arc<dyn DriverFactory>,
    /// Idempotent schema/state migration, run first on every election.
    pub migration: Arc<dyn Migration>,
    /// Signals cooperating subsystems to become active / drain.
    pub coordinator: Arc<dyn LeadershipCoordinator>,
    /// {on_elected, on_defeated} pairs invoked on every transition.
    pub callbacks: Vec<Arc<dyn LeadershipCallback>>,
    /// Task-state store cleared on defeat.
    pub task_tracker: Arc<dyn TaskTracker>,
    /// App-definition lookups for the peer surface.
    pub app_repository: Arc<dyn AppRepository>,
    /// Handle to the scheduler actor.
    pub scheduler: SchedulerHandle,
}

/// The long-running scheduler service.
pub struct SchedulerService {
    cfg: Config,
    bus: Bus,
    core: Arc<LeaderCore>,
    apps: Arc<dyn AppRepository>,
    scheduler: SchedulerHandle,
    started: OnceLock<Instant>,
}

impl SchedulerService {
    /// Wires the service: event bus, leader core, peer surface.
    ///
    /// The candidacy mode (HA or solo) is fixed here for the service's
    /// lifetime.
    pub fn new(cfg: Config, candidacy: Candidacy, collaborators: Collaborators) -> Self {
        let bus = Bus::new(cfg.bus_capacity);
        let core = LeaderCore::new(cfg.clone(), bus.clone(), candidacy, &collaborators);
        Self {
            apps: collaborators.app_repository,
            scheduler: collaborators.scheduler,
            started: OnceLock::new(),
            cfg,
            bus,
            core,
        }
    }

    /// Records the service start. No blocking work.
    pub fn start_up(&self) {
        if self.started.set(Instant::now()).is_ok() {
            debug!("scheduler service starting");
        }
    }

    /// Time since `start_up`, if the service has started.
    pub fn uptime(&self) -> Option<Duration> {
        self.started.get().map(Instant::elapsed)
    }

    /// Offers candidacy, then blocks until the shutdown latch is released.
    pub async fn run(&self) {
        self.start_up();
        self.spawn_log_listener();
        self.core.offer_candidacy().await;
        self.core.await_shutdown().await;
        info!(uptime = ?self.uptime(), "scheduler service stopped");
    }

    /// Like [`run`](Self::run), but hands leadership over on SIGINT /
    /// SIGTERM / SIGQUIT: the signal triggers shutdown, which stops the
    /// driver with failover so a peer replica can take the fleet.
    pub async fn run_until_signal(&self) -> std::io::Result<()> {
        let run = self.run();
        tokio::pin!(run);
        tokio::select! {
            _ = &mut run => Ok(()),
            res = termination_signal() => {
                self.trigger_shutdown().await;
                run.await;
                res
            }
        }
    }

    /// Idempotent shutdown: clears the leader flag, stops the driver,
    /// cancels the ticker, releases the latch exactly once.
    pub async fn trigger_shutdown(&self) {
        self.core.trigger_shutdown().await;
    }

    /// Read-only leader flag for peripheral subsystems.
    pub fn leader(&self) -> LeaderView {
        self.core.leader_view()
    }

    /// Subscribes to the lifecycle event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Mirrors every bus event into `tracing`.
    fn spawn_log_listener(&self) {
        let mut rx = self.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => log_event(&ev),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        });
    }

    // ---------------------------
    // Peer surface
    // ---------------------------

    /// Starts a deployment; resolves on start, fails with the original
    /// cause when the scheduler actor rejects it.
    pub async fn deploy(&self, plan: DeploymentPlan, force: bool) -> Result<(), ServiceError> {
        self.scheduler.deploy(plan, force).await
    }

    /// Cancels a running deployment. Fire-and-forget.
    pub fn cancel_deployment(&self, id: impl Into<String>) {
        self.scheduler
            .tell(SchedulerCommand::CancelDeployment { id: id.into() });
    }

    /// Lists deployments in progress, bounded by the coordination timeout.
    pub async fn list_running_deployments(&self) -> Result<Vec<DeploymentPlan>, ServiceError> {
        match timeout(
            self.cfg.coordination_timeout,
            self.scheduler.running_deployments(),
        )
        .await
        {
            Err(_) => Err(ServiceError::Timeout {
                timeout: self.cfg.coordination_timeout,
            }),
            Ok(result) => result,
        }
    }

    /// Looks up an app, optionally at a specific version.
    pub async fn get_app(
        &self,
        id: &AppId,
        version: Option<&str>,
    ) -> Result<Option<AppDefinition>, ServiceError> {
        match timeout(self.cfg.coordination_timeout, self.apps.get_app(id, version)).await {
            Err(_) => Err(ServiceError::Timeout {
                timeout: self.cfg.coordination_timeout,
            }),
            Ok(Ok(app)) => Ok(app),
            Ok(Err(e)) => Err(ServiceError::Repository { source: e }),
        }
    }

    /// Lists the known versions of an app, newest first.
    pub async fn list_app_versions(&self, id: &AppId) -> Result<Vec<String>, ServiceError> {
        match timeout(self.cfg.coordination_timeout, self.apps.list_app_versions(id)).await {
            Err(_) => Err(ServiceError::Timeout {
                timeout: self.cfg.coordination_timeout,
            }),
            Ok(Ok(versions)) => Ok(versions),
            Ok(Err(e)) => Err(ServiceError::Repository { source: e }),
        }
    }

    /// Asks the scheduler actor to kill `tasks` and echoes them back.
    /// Fire-and-forget.
    pub fn kill_tasks(&self, app_id: AppId, tasks: Vec<TaskId>) -> Vec<TaskId> {
        self.scheduler.tell(SchedulerCommand::KillTasks {
            app_id,
            tasks: tasks.clone(),
        });
        tasks
    }
}

/// Resolves when the process is asked to give up its place in the fleet.
///
/// Any of the usual termination signals counts: an interactive Ctrl-C, the
/// SIGTERM sent by init systems and container runtimes, or a SIGQUIT hard
/// stop. The caller reacts by abdicating — stopping the driver with
/// failover — rather than by exiting abruptly, so the resource-offer master
/// keeps the fleet's tasks while another replica takes over.
#[cfg(unix)]
async fn termination_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut streams = [
        signal(SignalKind::interrupt())?,
        signal(SignalKind::terminate())?,
        signal(SignalKind::quit())?,
    ];
    let waits = streams.iter_mut().map(|s| Box::pin(s.recv()));
    futures::future::select_all(waits).await;
    Ok(())
}

/// Resolves when the process is asked to give up its place in the fleet.
///
/// Non-unix platforms only deliver Ctrl-C.
#[cfg(not(unix))]
async fn termination_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Translates bus events into `tracing` records.
fn log_event(ev: &Event) {
    match ev.kind {
        EventKind::ElectedAsLeader => info!(seq = ev.seq, "event: elected as leader"),
        EventKind::Standby => info!(seq = ev.seq, "event: standby"),
        EventKind::ShutdownRequested => info!(seq = ev.seq, "event: shutdown requested"),
        EventKind::PreparationFailed => {
            warn!(seq = ev.seq, error = ?ev.error, "event: preparation failed");
        }
        EventKind::OfferScheduled => {
            debug!(seq = ev.seq, delay = ?ev.delay, "event: candidacy offer scheduled");
        }
        EventKind::DriverStarted => debug!(seq = ev.seq, "event: driver started"),
        EventKind::DriverExited => {
            debug!(seq = ev.seq, error = ?ev.error, "event: driver exited");
        }
    }
}
