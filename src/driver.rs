//! # Driver abstraction over the resource-offer client.
//!
//! Defines the [`Driver`] contract for the single in-process client of the
//! resource-offer master, and the [`DriverFactory`] that builds one fresh
//! instance per activation.
//!
//! - **[`Driver`]** — trait for a non-reusable client session
//! - **[`DriverRef`]** — shared handle (`Arc<dyn Driver>`) held by the slot
//!   and the worker
//! - **[`DriverFactory`]** — constructs a new driver for each epoch
//!
//! ## Rules
//! - A driver instance is **not reusable**: once [`Driver::stop`] has been
//!   issued, the handle is released and a new instance must be constructed
//!   for any later activation.
//! - [`Driver::run`] resolves only when the driver has been stopped — by
//!   [`Driver::stop`], by loss of mastership, or by an internal failure.
//! - At most one driver instance exists at any moment; the driver supervisor
//!   owns the only slot.

use std::sync::Arc;

use async_trait::async_trait;

/// Shared handle to a driver instance.
///
/// Held by the supervisor's slot while the worker awaits [`Driver::run`];
/// released when the driver stops.
pub type DriverRef = Arc<dyn Driver>;

/// A single session against the resource-offer master.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Drives the session until it is stopped.
    ///
    /// Resolves `Ok(())` on an orderly stop and `Err` when the session
    /// terminates exceptionally. Must be called at most once per instance.
    async fn run(&self) -> anyhow::Result<()>;

    /// Stops the session.
    ///
    /// With `failover = true` the resource-offer master is asked to hold the
    /// fleet's tasks for a short period so another replica can take over.
    /// Stopping is idempotent; repeated calls are no-ops.
    async fn stop(&self, failover: bool);
}

/// Builds one fresh [`Driver`] per activation.
#[async_trait]
pub trait DriverFactory: Send + Sync + 'static {
    /// Constructs a new driver instance for the current epoch.
    async fn create_driver(&self) -> anyhow::Result<DriverRef>;
}
