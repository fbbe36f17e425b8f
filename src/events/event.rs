//! # Leadership lifecycle events.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Candidacy events**: offer scheduling and preparation outcomes
//! - **Leadership events**: the `ElectedAsLeader` / `Standby` pair observed
//!   by peripheral subsystems
//! - **Driver and shutdown events**: driver worker lifecycle and the
//!   shutdown barrier
//!
//! The [`Event`] struct carries additional metadata such as error messages
//! and backoff delays.
//!
//! ## Ordering guarantees
//! Each event's sequence number (`seq`) is assigned by the
//! [`Bus`](crate::events::Bus) when the event is published, increasing
//! monotonically per bus, so consumers can order events correctly even when
//! they are delivered through async channels. A freshly constructed event
//! carries no meaningful `seq` until published.
//!
//! ## Event flow examples
//!
//! ### Successful activation
//! ```text
//! OfferScheduled → [elected, preparation] → DriverStarted → ElectedAsLeader
//! ```
//!
//! ### Preparation failure
//! ```text
//! OfferScheduled → [elected] → PreparationFailed → Standby → OfferScheduled
//! ```
//!
//! ### Defeat
//! ```text
//! ElectedAsLeader → … → [defeated] → DriverExited → Standby → OfferScheduled
//! ```

use std::time::{Duration, SystemTime};

/// Classification of leadership lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Candidacy events ===
    /// A candidacy offer was scheduled after the current backoff delay.
    OfferScheduled,
    /// Elected preparation failed; the core abdicates and re-offers.
    PreparationFailed,

    // === Leadership events ===
    /// This replica activated as leader.
    ElectedAsLeader,
    /// This replica returned to standby (defeat, abdication, or failure).
    Standby,

    // === Driver events ===
    /// The driver worker started running a fresh driver instance.
    DriverStarted,
    /// The driver worker completed (stopped, defeated, or crashed).
    DriverExited,

    // === Shutdown events ===
    /// Shutdown was triggered; the latch is released.
    ShutdownRequested,
}

/// Lifecycle event with optional metadata.
///
/// Carries information about candidacy, leadership transitions, driver
/// lifecycle, backoff delays, and timing.
#[derive(Clone, Debug)]
pub struct Event {
    /// Sequence number assigned by the bus at publish time, monotonically
    /// increasing per bus. Zero until published.
    pub seq: u64,
    /// Wall-clock timestamp (may go backwards, use for logging only).
    pub at: SystemTime,
    /// Backoff delay before the next offer (if relevant).
    pub delay: Option<Duration>,
    /// Error message, if the event represents a failure.
    pub error: Option<String>,
    /// The kind of event.
    pub kind: EventKind,
}

impl Event {
    /// Creates a new event of the given kind, timestamped now.
    ///
    /// The sequence number is stamped later, by the bus that publishes it.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: 0,
            at: SystemTime::now(),
            delay: None,
            error: None,
            kind,
        }
    }

    /// Attaches an error message.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }

    /// Attaches a backoff delay.
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay = Some(d);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_attach_metadata() {
        let ev = Event::new(EventKind::PreparationFailed)
            .with_error("boom")
            .with_delay(Duration::from_secs(1));
        assert_eq!(ev.error.as_deref(), Some("boom"));
        assert_eq!(ev.delay, Some(Duration::from_secs(1)));
        assert_eq!(ev.seq, 0, "seq belongs to the bus, not the constructor");
    }
}
