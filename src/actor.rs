//! # Messaging surface of the scheduler actor.
//!
//! The scheduler actor is the external collaborator owning task placement
//! and deployment logic. The core addresses it with fire-and-forget
//! [`SchedulerCommand`]s through a [`SchedulerHandle`]; request/reply
//! commands carry a oneshot responder.
//!
//! ## Architecture
//! ```text
//! ticker ──ScaleApps/Reconcile*──►┐
//! service ──Deploy/Kill/Cancel──►├──► mpsc queue ──► scheduler actor
//!                                 │        (external collaborator)
//!                                 └◄── oneshot replies (Deploy, Retrieve…)
//! ```
//!
//! ## Rules
//! - Fire-and-forget sends never block the caller; when the queue is full
//!   the command is dropped and a warning logged.
//! - Request/reply awaits are bounded by the caller (the service applies
//!   `coordination_timeout` to deployment listing).

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::error::ServiceError;
use crate::model::{AppId, DeploymentPlan, TaskId};

/// Messages accepted by the scheduler actor.
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Adjust instance counts of all apps to their target.
    ScaleApps,
    /// Ask the resource-offer master for the authoritative task state.
    ReconcileTasks,
    /// Re-sync health-check state with known tasks.
    ReconcileHealthChecks,
    /// Kill the given tasks of one app.
    KillTasks {
        /// Owning application.
        app_id: AppId,
        /// Tasks to kill.
        tasks: Vec<TaskId>,
    },
    /// Cancel a running deployment.
    CancelDeployment {
        /// Plan identifier.
        id: String,
    },
    /// Start a deployment; the responder resolves once it is started.
    Deploy {
        /// Plan to execute.
        plan: DeploymentPlan,
        /// Cancel conflicting deployments instead of rejecting.
        force: bool,
        /// Resolves on start, fails with the original cause on rejection.
        done: oneshot::Sender<anyhow::Result<()>>,
    },
    /// List deployments currently in progress.
    RetrieveRunningDeployments {
        /// Receives the running plans.
        reply: oneshot::Sender<Vec<DeploymentPlan>>,
    },
}

/// Handle for addressing the scheduler actor.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Creates a handle and the receiver the external actor consumes.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SchedulerCommand>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Sends a command without blocking.
    ///
    /// When the queue is full or the actor is gone the command is dropped
    /// and a warning logged; periodic jobs tolerate missed ticks.
    pub fn tell(&self, cmd: SchedulerCommand) {
        if let Err(e) = self.tx.try_send(cmd) {
            match e {
                mpsc::error::TrySendError::Full(cmd) => {
                    warn!(?cmd, "scheduler actor queue full, dropping command");
                }
                mpsc::error::TrySendError::Closed(cmd) => {
                    warn!(?cmd, "scheduler actor gone, dropping command");
                }
            }
        }
    }

    /// Starts a deployment and awaits the start acknowledgement.
    ///
    /// Resolves once the actor has started the deployment; fails with the
    /// original cause when the actor rejects it.
    pub async fn deploy(&self, plan: DeploymentPlan, force: bool) -> Result<(), ServiceError> {
        let (done, ack) = oneshot::channel();
        self.tx
            .send(SchedulerCommand::Deploy { plan, force, done })
            .await
            .map_err(|_| ServiceError::ActorClosed)?;

        match ack.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(cause)) => Err(ServiceError::Deployment { source: cause }),
            Err(_) => Err(ServiceError::ActorClosed),
        }
    }

    /// Asks for the deployments currently in progress.
    ///
    /// The caller bounds the await; this resolves when the actor replies.
    pub async fn running_deployments(&self) -> Result<Vec<DeploymentPlan>, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SchedulerCommand::RetrieveRunningDeployments { reply })
            .await
            .map_err(|_| ServiceError::ActorClosed)?;
        rx.await.map_err(|_| ServiceError::ActorClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deploy_resolves_on_start() {
        let (handle, mut rx) = SchedulerHandle::channel(4);

        let actor = tokio::spawn(async move {
            match rx.recv().await {
                Some(SchedulerCommand::Deploy { done, .. }) => {
                    done.send(Ok(())).unwrap();
                }
                other => panic!("unexpected command: {other:?}"),
            }
        });

        let plan = DeploymentPlan {
            id: "d-1".into(),
            affected_apps: vec![AppId::new("/demo")],
        };
        handle.deploy(plan, false).await.unwrap();
        actor.await.unwrap();
    }

    #[tokio::test]
    async fn deploy_surfaces_original_cause() {
        let (handle, mut rx) = SchedulerHandle::channel(4);

        tokio::spawn(async move {
            if let Some(SchedulerCommand::Deploy { done, .. }) = rx.recv().await {
                done.send(Err(anyhow::anyhow!("conflicting deployment"))).unwrap();
            }
        });

        let plan = DeploymentPlan {
            id: "d-2".into(),
            affected_apps: vec![],
        };
        let err = handle.deploy(plan, true).await.unwrap_err();
        assert!(matches!(err, ServiceError::Deployment { .. }));
        assert!(err.to_string().contains("conflicting deployment"));
    }

    #[tokio::test]
    async fn tell_drops_when_queue_full() {
        let (handle, rx) = SchedulerHandle::channel(1);
        handle.tell(SchedulerCommand::ScaleApps);
        // Queue full: dropped, no panic, receiver still holds one command.
        handle.tell(SchedulerCommand::ReconcileTasks);
        drop(rx);
        handle.tell(SchedulerCommand::ScaleApps);
    }
}
