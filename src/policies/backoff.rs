//! # Backoff policy for retrying candidacy offers.
//!
//! [`OfferBackoff`] controls how long the core waits before re-offering
//! candidacy after a failed elected-preparation. It is parameterized by:
//! - [`OfferBackoff::initial`] the starting delay;
//! - [`OfferBackoff::ceiling`] the growth cutoff.
//!
//! The delay doubles on every failure **while it is at or below the
//! ceiling**. The comparison is inclusive, so one doubling past the ceiling
//! occurs and the largest observable delay is `2 × ceiling`. A successful
//! activation resets the delay to `initial`.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use fleethelm::OfferBackoff;
//!
//! let mut backoff = OfferBackoff::default();
//! assert_eq!(backoff.delay(), Duration::from_millis(500));
//!
//! backoff.increase();
//! assert_eq!(backoff.delay(), Duration::from_secs(1));
//!
//! backoff.reset();
//! assert_eq!(backoff.delay(), Duration::from_millis(500));
//! ```

use std::time::Duration;

/// Candidacy offer backoff.
///
/// Doubling delay bounded by an inclusive ceiling, reset on activation.
/// Mutated only under the leader core's candidacy serialization; readers
/// snapshot [`delay`](OfferBackoff::delay) under the same guard.
#[derive(Clone, Copy, Debug)]
pub struct OfferBackoff {
    /// Delay applied to the next scheduled offer.
    delay: Duration,
    /// Starting delay, restored by [`reset`](OfferBackoff::reset).
    pub initial: Duration,
    /// Inclusive growth cutoff: increases apply while `delay <= ceiling`.
    pub ceiling: Duration,
}

impl Default for OfferBackoff {
    /// Returns a backoff with:
    /// - `initial = 500ms`;
    /// - `ceiling = 16s`.
    fn default() -> Self {
        let initial = Duration::from_millis(500);
        Self {
            delay: initial,
            initial,
            ceiling: Duration::from_secs(16),
        }
    }
}

impl OfferBackoff {
    /// Creates a backoff with explicit bounds.
    pub fn new(initial: Duration, ceiling: Duration) -> Self {
        Self {
            delay: initial,
            initial,
            ceiling,
        }
    }

    /// Returns the delay to apply to the next offer.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Doubles the delay if it has not yet exceeded the ceiling.
    ///
    /// The comparison is inclusive: once the delay passes the ceiling,
    /// further increases are skipped, so the largest observable delay is
    /// `2 × ceiling`.
    pub fn increase(&mut self) {
        if self.delay <= self.ceiling {
            self.delay *= 2;
        }
    }

    /// Restores the initial delay. Called on successful activation.
    pub fn reset(&mut self) {
        self.delay = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_on_each_increase() {
        let mut b = OfferBackoff::default();
        let expected = [1_000, 2_000, 4_000, 8_000, 16_000];
        for ms in expected {
            b.increase();
            assert_eq!(b.delay(), Duration::from_millis(ms));
        }
    }

    #[test]
    fn one_doubling_past_the_ceiling() {
        let mut b = OfferBackoff::default();
        for _ in 0..6 {
            b.increase();
        }
        // 16s <= 16s still doubles; 32s does not.
        assert_eq!(b.delay(), Duration::from_secs(32));
        b.increase();
        assert_eq!(b.delay(), Duration::from_secs(32));
    }

    #[test]
    fn reset_restores_initial() {
        let mut b = OfferBackoff::default();
        b.increase();
        b.increase();
        b.reset();
        assert_eq!(b.delay(), Duration::from_millis(500));
    }

    #[test]
    fn custom_bounds() {
        let mut b = OfferBackoff::new(Duration::from_secs(1), Duration::from_secs(2));
        b.increase();
        assert_eq!(b.delay(), Duration::from_secs(2));
        b.increase();
        assert_eq!(b.delay(), Duration::from_secs(4));
        b.increase();
        assert_eq!(b.delay(), Duration::from_secs(4));
    }
}
