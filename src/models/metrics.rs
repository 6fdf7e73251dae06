//! Process-wide request counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Request counters shared by every handler.
///
/// Monotonic, reset only on restart. Handed out as `Arc<RequestMetrics>`.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    total: AtomicU64,
    invalid: AtomicU64,
    failed: AtomicU64,
    success: AtomicU64,
}

/// Point-in-time copy of [`RequestMetrics`].
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestCounts {
    pub total: u64,
    pub invalid: u64,
    pub failed: u64,
    pub success: u64,
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_invalid(&self) {
        self.invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RequestCounts {
        RequestCounts {
            total: self.total.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
        }
    }
}
