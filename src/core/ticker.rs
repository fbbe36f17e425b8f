//! # Periodic control-loop ticker.
//!
//! [`EpochTicker`] owns the recurring jobs of one leadership epoch:
//!
//! | Job | Initial delay | Period | Action |
//! |---|---|---|---|
//! | scale-apps | `scale_apps_initial_delay` | `scale_apps_interval` | send `ScaleApps` |
//! | reconcile | `reconciliation_initial_delay` | `reconciliation_interval` | send `ReconcileTasks`, `ReconcileHealthChecks` |
//! | expunge-orphans | `reconciliation_initial_delay + reconciliation_interval` | one-shot | expunge orphaned tasks |
//!
//! ## Rules
//! - A ticker belongs to exactly one epoch: it is created fresh on every
//!   activation and cancelled on every defeat, so an earlier epoch's jobs
//!   can never fire into the next one.
//! - Every job re-checks the leader view at fire time; an in-flight fire
//!   after defeat observes `false` and performs no side effect.
//! - Cancellation is cooperative: cancelling the epoch token ends each job
//!   at its current await point.

use std::sync::Arc;
use std::time::Duration;

use tokio::{select, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::actor::{SchedulerCommand, SchedulerHandle};
use crate::collaborators::TaskTracker;
use crate::config::Config;
use crate::core::flag::LeaderView;

/// Recurring jobs of a single leadership epoch.
pub(crate) struct EpochTicker {
    token: CancellationToken,
    jobs: Vec<JoinHandle<()>>,
}

impl EpochTicker {
    /// Arms the three jobs for a fresh epoch.
    pub(crate) fn start(
        cfg: &Config,
        leader: LeaderView,
        scheduler: SchedulerHandle,
        tracker: Arc<dyn TaskTracker>,
    ) -> Self {
        let token = CancellationToken::new();
        let mut jobs = Vec::with_capacity(3);

        {
            let scheduler = scheduler.clone();
            jobs.push(tokio::spawn(run_periodic(
                token.child_token(),
                leader.clone(),
                cfg.scale_apps_initial_delay,
                cfg.scale_apps_interval,
                move || scheduler.tell(SchedulerCommand::ScaleApps),
            )));
        }

        {
            let scheduler = scheduler.clone();
            jobs.push(tokio::spawn(run_periodic(
                token.child_token(),
                leader.clone(),
                cfg.reconciliation_initial_delay,
                cfg.reconciliation_interval,
                move || {
                    scheduler.tell(SchedulerCommand::ReconcileTasks);
                    scheduler.tell(SchedulerCommand::ReconcileHealthChecks);
                },
            )));
        }

        {
            let delay = cfg.reconciliation_initial_delay + cfg.reconciliation_interval;
            jobs.push(tokio::spawn(expunge_once(
                token.child_token(),
                leader,
                delay,
                tracker,
            )));
        }

        Self { token, jobs }
    }

    /// Cancels the epoch: every job ends at its current await point.
    pub(crate) fn cancel(self) {
        self.token.cancel();
        drop(self.jobs);
    }
}

/// Fires `tick` every `period` after `initial`, while the epoch is alive
/// and this replica leads.
async fn run_periodic<F>(
    token: CancellationToken,
    leader: LeaderView,
    initial: Duration,
    period: Duration,
    tick: F,
) where
    F: Fn() + Send + 'static,
{
    let first = time::sleep(initial);
    tokio::pin!(first);
    select! {
        _ = &mut first => {}
        _ = token.cancelled() => return,
    }

    loop {
        if token.is_cancelled() {
            return;
        }
        if leader.is_leader() {
            tick();
        }
        let sleep = time::sleep(period);
        tokio::pin!(sleep);
        select! {
            _ = &mut sleep => {}
            _ = token.cancelled() => return,
        }
    }
}

/// One-shot orphan expungement, gated on the leader view at fire time.
async fn expunge_once(
    token: CancellationToken,
    leader: LeaderView,
    delay: Duration,
    tracker: Arc<dyn TaskTracker>,
) {
    let sleep = time::sleep(delay);
    tokio::pin!(sleep);
    select! {
        _ = &mut sleep => {}
        _ = token.cancelled() => return,
    }

    if !leader.is_leader() {
        return;
    }
    debug!("expunging orphaned tasks");
    if let Err(e) = tracker.expunge_orphaned_tasks().await {
        warn!(error = %e, "orphan expungement failed");
    }
}
