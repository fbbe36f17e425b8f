//! # DriverSupervisor: owner of the single driver slot.
//!
//! Wraps the non-reusable resource-offer driver: installs a fresh instance
//! per activation, runs it to completion on a dedicated worker, and stops
//! it on defeat or shutdown.
//!
//! ## Architecture
//! ```text
//! LeaderCore ──install(driver)──► [slot]
//!            ──spawn_worker(hook)──► worker
//!                                      │
//!                                 driver.run()      (resolves on stop,
//!                                      │             defeat, or crash)
//!                                      ▼
//!                          publish DriverExited
//!                                      ▼
//!                    LeaderCore::handle_driver_exit(hook)
//! ```
//!
//! ## Rules
//! - At most one driver instance exists at any moment; the slot is the only
//!   place a handle lives between install and stop.
//! - Installation and worker spawn are separate steps: the leader core
//!   finishes its `Active` transition in between, so a driver that exits
//!   immediately can never deliver its defeat against a half-activated
//!   epoch.
//! - A stopped driver is released, never relaunched; the factory builds a
//!   new instance for the next activation.
//! - `stop` is safe to call at any time and in any order with the worker's
//!   own exit: the slot take and the driver's idempotent stop absorb the
//!   race.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::core::leader::LeaderCore;
use crate::driver::DriverRef;
use crate::election::AbdicationHook;
use crate::events::{Bus, Event, EventKind};

/// Owns the mutable driver slot and the worker awaiting `driver.run()`.
pub(crate) struct DriverSupervisor {
    slot: Mutex<Option<DriverRef>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    bus: Bus,
}

impl DriverSupervisor {
    pub(crate) fn new(bus: Bus) -> Self {
        Self {
            slot: Mutex::new(None),
            worker: Mutex::new(None),
            bus,
        }
    }

    /// Installs `driver` in the slot without running it.
    ///
    /// The caller completes its state transition before calling
    /// [`spawn_worker`](Self::spawn_worker); until then the driver cannot
    /// exit, so no defeat can be delivered against a half-activated epoch.
    pub(crate) async fn install(&self, driver: DriverRef) {
        let mut slot = self.slot.lock().await;
        debug_assert!(slot.is_none(), "driver slot already occupied");
        *slot = Some(driver);
    }

    /// Spawns the worker for the installed driver.
    ///
    /// The worker awaits `driver.run()`; on completion it publishes
    /// `DriverExited`, then hands the abdication hook (and the re-offer
    /// decision) back to the leader core. Once the worker runs, the hook
    /// belongs to this exit path.
    ///
    /// If the slot was emptied between install and spawn (defeat or
    /// shutdown won the race), no worker exists to run the hook, so it is
    /// executed here to relinquish candidacy.
    pub(crate) async fn spawn_worker(&self, hook: Option<AbdicationHook>, core: Weak<LeaderCore>) {
        let driver = self.slot.lock().await.clone();
        let Some(driver) = driver else {
            warn!("driver released before its worker started, relinquishing");
            if let Some(hook) = hook {
                hook.execute().await;
            }
            return;
        };

        self.bus.publish(Event::new(EventKind::DriverStarted));
        info!("driver worker starting");

        let bus = self.bus.clone();
        let handle = tokio::spawn(async move {
            let result = driver.run().await;

            match &result {
                Ok(()) => info!("driver exited"),
                Err(e) => error!(error = %e, "driver exited exceptionally"),
            }
            let mut ev = Event::new(EventKind::DriverExited);
            if let Err(e) = &result {
                ev = ev.with_error(e.to_string());
            }
            bus.publish(ev);

            if let Some(core) = core.upgrade() {
                core.handle_driver_exit(hook).await;
            }
        });

        *self.worker.lock().await = Some(handle);
    }

    /// Stops the current driver, releases the handle, and drains the worker.
    ///
    /// The stop is graceful with `failover = true`, asking the resource-offer
    /// master to hold the fleet's tasks briefly so another replica can take
    /// over. Waiting for the worker is bounded by `grace`.
    pub(crate) async fn stop(&self, grace: Duration) {
        // Take both handles before awaiting so the locks are never held
        // across the stop or the drain.
        let driver = self.slot.lock().await.take();
        if let Some(driver) = driver {
            info!("stopping driver (failover enabled)");
            driver.stop(true).await;
        }

        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            match timeout(grace, worker).await {
                Err(_) => warn!(?grace, "driver worker did not drain within grace"),
                Ok(Err(e)) if e.is_panic() => error!("driver worker panicked"),
                Ok(_) => {}
            }
        }
    }
}
