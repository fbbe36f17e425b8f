//! # Contracts consumed from external collaborators.
//!
//! Each trait here is a narrow contract, not a library: the core sequences
//! calls into these collaborators but never implements their logic.
//!
//! - **[`Migration`]** — idempotent schema/state migration run once per
//!   election, before anything else
//! - **[`LeadershipCallback`]** — {on_elected, on_defeated} capability pairs
//!   invoked on every transition; completions are aggregated and awaited
//!   with a single timeout
//! - **[`LeadershipCoordinator`]** — signals cooperating subsystems to
//!   become active / drain
//! - **[`TaskTracker`]** — task-state store cleared on defeat and asked to
//!   expunge orphaned tasks
//! - **[`AppRepository`]** — app-definition lookups for the peer surface
//!
//! Contract errors are `anyhow::Error`; the core wraps them into
//! [`LeadershipError`](crate::LeadershipError) variants on the preparation
//! path and logs them on the defeat path.

use async_trait::async_trait;

use crate::model::{AppDefinition, AppId};

/// Idempotent schema/state migration.
#[async_trait]
pub trait Migration: Send + Sync + 'static {
    /// Brings persisted state up to the current schema.
    ///
    /// Runs first in every elected preparation; failure aborts the
    /// preparation. Must be safe to run again after a partial earlier run.
    async fn migrate(&self) -> anyhow::Result<()>;
}

/// A {prepare, release} capability pair invoked on every transition.
///
/// Callbacks may be executed in parallel; the core aggregates their
/// completions and awaits them with a single timeout.
#[async_trait]
pub trait LeadershipCallback: Send + Sync + 'static {
    /// Invoked after migration when this replica is elected.
    async fn on_elected(&self) -> anyhow::Result<()>;

    /// Invoked when this replica is defeated or abdicates.
    async fn on_defeated(&self) -> anyhow::Result<()>;

    /// Name used in logs when a callback fails.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Signals cooperating subsystems to become active or drain.
#[async_trait]
pub trait LeadershipCoordinator: Send + Sync + 'static {
    /// Completes when the subsystems are ready for scheduling work.
    async fn prepare_for_start(&self) -> anyhow::Result<()>;

    /// Completes when the subsystems have drained.
    async fn stop(&self) -> anyhow::Result<()>;
}

/// Task-state store owned by an external collaborator.
#[async_trait]
pub trait TaskTracker: Send + Sync + 'static {
    /// Drops all in-memory task state. Called on defeat so the next leader
    /// rebuilds from the authoritative store.
    async fn clear(&self) -> anyhow::Result<()>;

    /// Removes task records whose owning application no longer exists.
    async fn expunge_orphaned_tasks(&self) -> anyhow::Result<()>;
}

/// App-definition lookups for the peer surface.
#[async_trait]
pub trait AppRepository: Send + Sync + 'static {
    /// Returns the app, optionally at a specific version.
    async fn get_app(
        &self,
        id: &AppId,
        version: Option<&str>,
    ) -> anyhow::Result<Option<AppDefinition>>;

    /// Returns the known version tags of the app, newest first.
    async fn list_app_versions(&self, id: &AppId) -> anyhow::Result<Vec<String>>;
}
