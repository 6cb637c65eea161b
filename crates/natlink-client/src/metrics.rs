//! Pool activity counters

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Counters describing tunnel-pool activity.
///
/// Shared between the pool task and observers through the pool handle. All
/// counters are monotonic except `consecutive_failures`, which mirrors the
/// pool's failure counter.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    connect_attempts: AtomicU64,
    established: AtomicU64,
    dial_failures: AtomicU64,
    activations: AtomicU64,
    consecutive_failures: AtomicU32,
}

impl PoolMetrics {
    pub(crate) fn record_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_established(&self) {
        self.established.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record_dial_failure(&self, consecutive: u32) {
        self.dial_failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(consecutive, Ordering::Relaxed);
    }

    pub(crate) fn record_activation(&self) {
        self.activations.fetch_add(1, Ordering::Relaxed);
    }

    /// Tunnel connections the pool has attempted to open.
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    /// Tunnel connections that completed their handshake.
    pub fn established(&self) -> u64 {
        self.established.load(Ordering::Relaxed)
    }

    /// Dials that failed with a refused/unreachable class error.
    pub fn dial_failures(&self) -> u64 {
        self.dial_failures.load(Ordering::Relaxed)
    }

    /// Idle connections that received relayed traffic and went active.
    pub fn activations(&self) -> u64 {
        self.activations.load(Ordering::Relaxed)
    }

    /// Current consecutive-failure count driving the backoff delay.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}
