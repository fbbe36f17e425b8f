//! # Global runtime configuration.
//!
//! [`Config`] defines the leadership core's behavior: coordination timeouts,
//! elected-preparation bounds, periodic control-loop timings, event bus
//! capacity, and the shutdown drain window.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use fleethelm::Config;
//!
//! let mut cfg = Config::default();
//! cfg.coordination_timeout = Duration::from_secs(10);
//! cfg.scale_apps_interval = Duration::from_secs(30);
//!
//! assert_eq!(cfg.scale_apps_interval, Duration::from_secs(30));
//! ```

use std::time::Duration;

/// Global configuration for the leadership core.
///
/// Controls coordination-service timeouts, elected-preparation bounds,
/// ticker timings, event bus capacity, and the shutdown drain window.
#[derive(Clone, Debug)]
pub struct Config {
    /// Bound on synchronous coordination lookups (app queries, deployment
    /// listing), on the migration await, and on defeat-path callback
    /// aggregation.
    pub coordination_timeout: Duration,
    /// Bound on the aggregated `on_elected` leadership callbacks.
    pub on_elected_prepare_timeout: Duration,
    /// Bound on the leadership coordinator's prepare-for-start.
    pub max_actor_startup_time: Duration,
    /// Initial delay before the first reconciliation tick.
    pub reconciliation_initial_delay: Duration,
    /// Period between reconciliation ticks.
    pub reconciliation_interval: Duration,
    /// Initial delay before the first scale-apps tick.
    pub scale_apps_initial_delay: Duration,
    /// Period between scale-apps ticks.
    pub scale_apps_interval: Duration,
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
    /// Maximum time to wait for the driver worker to drain on shutdown.
    pub grace: Duration,
}

impl Default for Config {
    /// Provides a default configuration:
    /// - `coordination_timeout = 10s`
    /// - `on_elected_prepare_timeout = 3min`
    /// - `max_actor_startup_time = 5s`
    /// - `reconciliation_initial_delay = 15s`
    /// - `reconciliation_interval = 5min`
    /// - `scale_apps_initial_delay = 15s`
    /// - `scale_apps_interval = 5min`
    /// - `bus_capacity = 1024`
    /// - `grace = 30s`
    fn default() -> Self {
        Self {
            coordination_timeout: Duration::from_secs(10),
            on_elected_prepare_timeout: Duration::from_secs(180),
            max_actor_startup_time: Duration::from_secs(5),
            reconciliation_initial_delay: Duration::from_secs(15),
            reconciliation_interval: Duration::from_secs(300),
            scale_apps_initial_delay: Duration::from_secs(15),
            scale_apps_interval: Duration::from_secs(300),
            bus_capacity: 1024,
            grace: Duration::from_secs(30),
        }
    }
}
