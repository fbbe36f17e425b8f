//! # Candidacy adapter over the coordination service.
//!
//! Provides the narrow election surface the leader core consumes:
//!
//! - **[`Candidate`]** — contract implemented by the coordination-service
//!   client: registers a listener and later calls it back on its own threads
//! - **[`ElectionListener`]** — implemented by the leader core; receives
//!   `on_elected` / `on_defeated`
//! - **[`AbdicationHook`]** — idempotent command that relinquishes candidacy
//! - **[`Candidacy`]** — the adapter itself, with *HA* and *solo* modes
//!
//! ## Modes
//! The mode is fixed at construction:
//! - **HA**: [`Candidacy::offer`] registers this replica with the real
//!   candidate; the service later invokes `on_elected(hook)` (at most one
//!   replica at a time) and `on_defeated()` on loss of leadership.
//! - **Solo**: no coordination service; `offer` invokes `on_elected(None)`
//!   directly and the replica self-elects.
//!
//! ## Rules
//! - All entry into the adapter is serialized by a single monitor, so a
//!   re-offer from the driver-exit path cannot interleave with one from the
//!   failure-recovery path.
//! - `on_elected` and `on_defeated` for a given epoch are serialized by the
//!   coordination service; the core relies on this.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

/// Boxed future returned by the abdication action.
pub type BoxAbdicationFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Idempotent command that relinquishes candidacy.
///
/// Received with every `on_elected`; the coordination service reacts by
/// invoking `on_defeated` on the listener. Exactly one path per epoch runs
/// it: the driver-exit handler once the driver has been launched, or the
/// preparation failure path before that point. The internal guard makes a
/// second `execute` a no-op.
pub struct AbdicationHook {
    action: Box<dyn Fn() -> BoxAbdicationFuture + Send + Sync>,
    fired: AtomicBool,
}

impl AbdicationHook {
    /// Wraps the coordination service's abdication action.
    pub fn new<F>(action: F) -> Self
    where
        F: Fn() -> BoxAbdicationFuture + Send + Sync + 'static,
    {
        Self {
            action: Box::new(action),
            fired: AtomicBool::new(false),
        }
    }

    /// Runs the abdication action at most once.
    pub async fn execute(&self) {
        if self.fired.swap(true, Ordering::AcqRel) {
            debug!("abdication hook already fired, skipping");
            return;
        }
        (self.action)().await;
    }

    /// Returns true once [`execute`](Self::execute) has fired the action.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Receives election outcomes from the coordination service.
///
/// Implemented by the leader core. Callbacks arrive on coordination-service
/// threads; for a given epoch they are serialized by the service.
#[async_trait]
pub trait ElectionListener: Send + Sync + 'static {
    /// This replica won the election.
    ///
    /// `hook` is `None` only in solo mode, where there is no candidacy to
    /// relinquish.
    async fn on_elected(&self, hook: Option<AbdicationHook>);

    /// This replica lost leadership.
    async fn on_defeated(&self);
}

/// Coordination-service candidate.
///
/// Registers the listener as a contender; the service invokes it back on its
/// own threads, electing at most one replica at a time.
#[async_trait]
pub trait Candidate: Send + Sync + 'static {
    /// Registers this replica's listener with the coordination service.
    async fn offer_leadership(&self, listener: Arc<dyn ElectionListener>) -> anyhow::Result<()>;
}

enum Mode {
    Solo,
    Ha(Arc<dyn Candidate>),
}

/// Thin indirection over the coordination-service candidate.
pub struct Candidacy {
    mode: Mode,
    monitor: Mutex<()>,
}

impl Candidacy {
    /// Builds a solo-mode adapter: no coordination service, self-elect on
    /// every offer.
    pub fn solo() -> Self {
        Self {
            mode: Mode::Solo,
            monitor: Mutex::new(()),
        }
    }

    /// Builds an HA-mode adapter around a real candidate.
    pub fn ha(candidate: Arc<dyn Candidate>) -> Self {
        Self {
            mode: Mode::Ha(candidate),
            monitor: Mutex::new(()),
        }
    }

    /// True when a real coordination service is present.
    pub fn is_ha(&self) -> bool {
        matches!(self.mode, Mode::Ha(_))
    }

    /// Offers candidacy on behalf of `listener`.
    ///
    /// Serialized by the adapter monitor. In solo mode this self-elects
    /// synchronously with no hook; in HA mode it registers with the
    /// candidate, which calls back asynchronously.
    pub async fn offer(&self, listener: Arc<dyn ElectionListener>) -> anyhow::Result<()> {
        let _guard = self.monitor.lock().await;
        match &self.mode {
            Mode::Solo => {
                debug!("no candidate configured, self-electing");
                listener.on_elected(None).await;
                Ok(())
            }
            Mode::Ha(candidate) => candidate.offer_leadership(listener).await,
        }
    }
}
