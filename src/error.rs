//! # Error types used by the leadership core.
//!
//! This module defines two main error enums:
//!
//! - [`LeadershipError`] failures on the elected-preparation critical path.
//! - [`ServiceError`] failures surfaced through the peer-facing service API.
//!
//! Both types provide `as_label` helpers for logs and metrics.
//!
//! Every [`LeadershipError`] is handled the same way: the core increases its
//! offer backoff, abdicates, and re-offers candidacy. No error on the
//! critical path recovers leadership in place.

use std::time::Duration;

use thiserror::Error;

/// # Failures on the elected-preparation critical path.
///
/// Raised while a freshly elected replica migrates state, runs leadership
/// callbacks, starts the coordinator, or constructs the driver.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LeadershipError {
    /// Data migration failed or exceeded the coordination timeout.
    #[error("data migration failed: {source}")]
    Migration {
        #[source]
        source: anyhow::Error,
    },

    /// A leadership callback failed during `on_elected`.
    #[error("leadership callback failed: {source}")]
    Callback {
        #[source]
        source: anyhow::Error,
    },

    /// The aggregated `on_elected` callbacks did not complete in time.
    #[error("leadership callbacks timed out after {timeout:?}")]
    CallbackTimeout { timeout: Duration },

    /// The leadership coordinator failed to prepare for start.
    #[error("leadership coordinator failed to start: {source}")]
    Coordinator {
        #[source]
        source: anyhow::Error,
    },

    /// The leadership coordinator did not become ready in time.
    #[error("leadership coordinator start timed out after {timeout:?}")]
    CoordinatorTimeout { timeout: Duration },

    /// Driver construction failed.
    #[error("driver construction failed: {source}")]
    DriverCreation {
        #[source]
        source: anyhow::Error,
    },
}

impl LeadershipError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            LeadershipError::Migration { .. } => "prepare_migration_failed",
            LeadershipError::Callback { .. } => "prepare_callback_failed",
            LeadershipError::CallbackTimeout { .. } => "prepare_callback_timeout",
            LeadershipError::Coordinator { .. } => "prepare_coordinator_failed",
            LeadershipError::CoordinatorTimeout { .. } => "prepare_coordinator_timeout",
            LeadershipError::DriverCreation { .. } => "prepare_driver_creation_failed",
        }
    }
}

/// # Failures surfaced through the peer-facing service API.
///
/// These never affect leadership state; they are reported to the caller.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The scheduler actor did not answer within the coordination timeout.
    #[error("scheduler actor timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The scheduler actor's command channel is closed.
    #[error("scheduler actor is unavailable")]
    ActorClosed,

    /// A deployment command was rejected; carries the original cause.
    #[error("deployment failed: {source}")]
    Deployment {
        #[source]
        source: anyhow::Error,
    },

    /// An app lookup failed in the repository.
    #[error("app lookup failed: {source}")]
    Repository {
        #[source]
        source: anyhow::Error,
    },
}

impl ServiceError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::Timeout { .. } => "service_timeout",
            ServiceError::ActorClosed => "service_actor_closed",
            ServiceError::Deployment { .. } => "service_deployment_failed",
            ServiceError::Repository { .. } => "service_repository_failed",
        }
    }
}
