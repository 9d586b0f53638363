use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Minimal counters for operational visibility. Cloning shares the cells.
#[derive(Clone, Default)]
pub struct Counters {
    pub fetch_ok: Arc<AtomicU64>,
    pub fetch_failed: Arc<AtomicU64>,
    pub fetch_fallback: Arc<AtomicU64>,
    pub rate_limited: Arc<AtomicU64>,

    pub quotes_rejected: Arc<AtomicU64>,

    pub triggers: Arc<AtomicU64>,
    pub escalations: Arc<AtomicU64>,
    pub dispatch_failed: Arc<AtomicU64>,
}

/// Point-in-time copy of [`Counters`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CountersSnapshot {
    pub fetch_ok: u64,
    pub fetch_failed: u64,
    pub fetch_fallback: u64,
    pub rate_limited: u64,
    pub quotes_rejected: u64,
    pub triggers: u64,
    pub escalations: u64,
    pub dispatch_failed: u64,
}

impl Counters {
    pub fn inc_fetch_ok(&self) {
        self.fetch_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fetch_failed(&self) {
        self.fetch_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fallback(&self) {
        self.fetch_fallback.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_quotes_rejected(&self) {
        self.quotes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_triggers(&self) {
        self.triggers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_escalations(&self) {
        self.escalations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dispatch_failed(&self) {
        self.dispatch_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CountersSnapshot {
            fetch_ok: load(&self.fetch_ok),
            fetch_failed: load(&self.fetch_failed),
            fetch_fallback: load(&self.fetch_fallback),
            rate_limited: load(&self.rate_limited),
            quotes_rejected: load(&self.quotes_rejected),
            triggers: load(&self.triggers),
            escalations: load(&self.escalations),
            dispatch_failed: load(&self.dispatch_failed),
        }
    }
}
