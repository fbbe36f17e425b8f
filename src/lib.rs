//! # fleethelm
//!
//! **Fleethelm** is the leadership and scheduler lifecycle core of a cluster
//! workload scheduler for two-level resource-offer platforms.
//!
//! In a highly-available deployment multiple replicas compete for leadership
//! through a coordination service; exactly one replica at a time drives the
//! resource-offer client and owns the scheduling decisions for the fleet.
//! Fleethelm owns *when* a driver is running and *who* is leader; all
//! scheduling work is delegated to the driver and an external scheduler
//! actor.
//!
//! ## Features
//!
//! | Area             | Description                                                        | Key types / traits                           |
//! |------------------|--------------------------------------------------------------------|----------------------------------------------|
//! | **Lifecycle**    | Long-running shell: start up, run, idempotent shutdown.            | [`SchedulerService`]                         |
//! | **Election**     | Candidacy offers, elected/defeated callbacks, abdication.          | [`Candidacy`], [`Candidate`], [`AbdicationHook`] |
//! | **Driver**       | One non-reusable resource-offer client session per epoch.          | [`Driver`], [`DriverFactory`]                |
//! | **Contracts**    | Narrow collaborator interfaces the core sequences.                 | [`Migration`], [`LeadershipCallback`], [`TaskTracker`] |
//! | **Control loop** | Periodic scale / reconcile / expunge jobs, gated per epoch.        | [`SchedulerCommand`], [`SchedulerHandle`]    |
//! | **Events**       | Sequenced lifecycle events on a broadcast bus.                     | [`Event`], [`EventKind`], [`Bus`]            |
//! | **Policies**     | Doubling offer backoff with ceiling and reset.                     | [`OfferBackoff`]                             |
//! | **Errors**       | Typed errors for preparation and the peer surface.                 | [`LeadershipError`], [`ServiceError`]        |
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use fleethelm::{
//!     AppDefinition, AppId, AppRepository, Candidacy, Collaborators, Config, Driver,
//!     DriverFactory, DriverRef, LeadershipCoordinator, Migration, SchedulerHandle,
//!     SchedulerService, TaskTracker,
//! };
//!
//! struct OfferDriver;
//!
//! #[async_trait]
//! impl Driver for OfferDriver {
//!     async fn run(&self) -> anyhow::Result<()> {
//!         // Blocks on the resource-offer master until stopped.
//!         Ok(())
//!     }
//!     async fn stop(&self, _failover: bool) {}
//! }
//!
//! struct OfferDriverFactory;
//!
//! #[async_trait]
//! impl DriverFactory for OfferDriverFactory {
//!     async fn create_driver(&self) -> anyhow::Result<DriverRef> {
//!         Ok(Arc::new(OfferDriver))
//!     }
//! }
//!
//! struct Store;
//!
//! #[async_trait]
//! impl Migration for Store {
//!     async fn migrate(&self) -> anyhow::Result<()> { Ok(()) }
//! }
//!
//! #[async_trait]
//! impl TaskTracker for Store {
//!     async fn clear(&self) -> anyhow::Result<()> { Ok(()) }
//!     async fn expunge_orphaned_tasks(&self) -> anyhow::Result<()> { Ok(()) }
//! }
//!
//! #[async_trait]
//! impl AppRepository for Store {
//!     async fn get_app(
//!         &self,
//!         _id: &AppId,
//!         _version: Option<&str>,
//!     ) -> anyhow::Result<Option<AppDefinition>> {
//!         Ok(None)
//!     }
//!     async fn list_app_versions(&self, _id: &AppId) -> anyhow::Result<Vec<String>> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! #[async_trait]
//! impl LeadershipCoordinator for Store {
//!     async fn prepare_for_start(&self) -> anyhow::Result<()> { Ok(()) }
//!     async fn stop(&self) -> anyhow::Result<()> { Ok(()) }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (scheduler, commands) = SchedulerHandle::channel(256);
//!     // `commands` is consumed by the external scheduler actor.
//!     drop(commands);
//!
//!     let store = Arc::new(Store);
//!     let service = SchedulerService::new(
//!         Config::default(),
//!         Candidacy::solo(),
//!         Collaborators {
//!             driver_factory: Arc::new(OfferDriverFactory),
//!             migration: store.clone(),
//!             coordinator: store.clone(),
//!             callbacks: Vec::new(),
//!             task_tracker: store.clone(),
//!             app_repository: store,
//!             scheduler,
//!         },
//!     );
//!
//!     service.run_until_signal().await?;
//!     Ok(())
//! }
//! ```
//!
//! ---

mod actor;
mod collaborators;
mod config;
mod core;
mod driver;
mod election;
mod error;
mod events;
mod model;
mod policies;

// ---- Public re-exports ----

pub use actor::{SchedulerCommand, SchedulerHandle};
pub use collaborators::{
    AppRepository, LeadershipCallback, LeadershipCoordinator, Migration, TaskTracker,
};
pub use config::Config;
pub use crate::core::flag::LeaderView;
pub use crate::core::service::{Collaborators, SchedulerService};
pub use driver::{Driver, DriverFactory, DriverRef};
pub use election::{AbdicationHook, BoxAbdicationFuture, Candidacy, Candidate, ElectionListener};
pub use error::{LeadershipError, ServiceError};
pub use events::{Bus, Event, EventKind};
pub use model::{AppDefinition, AppId, DeploymentPlan, TaskId};
pub use policies::OfferBackoff;
