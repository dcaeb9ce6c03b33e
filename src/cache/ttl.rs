//! TTL / Jitter Policy
//!
//! Computes the effective expiry of a write. Staggered writes get a uniform
//! jitter around the nominal TTL so entries written together do not expire in
//! lockstep.

use rand::Rng;

use super::MAX_TTL;

// == TTL Policy ==
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TtlPolicy {
    /// TTL in seconds used when a write names none
    pub default_ttl: u64,
    /// Jitter half-width as a fraction of the nominal TTL
    pub stagger_ratio: f64,
}

impl TtlPolicy {
    pub fn new(default_ttl: u64, stagger_ratio: f64) -> Self {
        Self {
            default_ttl,
            stagger_ratio,
        }
    }

    /// Nominal TTL for a write: the requested TTL or the default, capped at
    /// [`MAX_TTL`].
    pub fn nominal(&self, requested: Option<u64>) -> u64 {
        requested.unwrap_or(self.default_ttl).min(MAX_TTL)
    }

    /// Final TTL in seconds, within `1..=MAX_TTL`.
    pub fn effective(&self, requested: Option<u64>, staggered: bool) -> u64 {
        let ttl = self.nominal(requested);
        let ttl = if staggered {
            stagger(ttl, self.stagger_ratio, &mut rand::thread_rng())
        } else {
            ttl
        };
        ttl.clamp(1, MAX_TTL)
    }
}

/// Draws uniformly from `[ttl - j, ttl + j]` with `j = ratio * ttl`, floored
/// to whole seconds and clamped to at least one.
pub fn stagger<R: Rng>(ttl: u64, ratio: f64, rng: &mut R) -> u64 {
    let nominal = ttl as f64;
    let jitter = nominal * ratio.max(0.0);
    let low = nominal - jitter;
    let high = nominal + jitter;

    let drawn = if high > low {
        rng.gen_range(low..=high)
    } else {
        nominal
    };
    (drawn.floor() as u64).max(1)
}
