//! Job server health counters.

use crate::jobs::JobCounts;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Point-in-time view of server health, as returned by `health_check`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub connections_total: u64,
    pub connections_active: usize,
    pub requests: u64,
    pub protocol_errors: u64,
    pub dispatch_failures: u64,
    pub engine_mode: &'static str,
    pub jobs: JobCounts,
}

/// Thread-safe server counters.
#[derive(Debug)]
pub struct ServerHealth {
    connections_total: AtomicU64,
    connections_active: AtomicUsize,
    requests: AtomicU64,
    protocol_errors: AtomicU64,
    dispatch_failures: AtomicU64,
    start_time: Instant,
}

impl Default for ServerHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerHealth {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicUsize::new(0),
            requests: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            dispatch_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn request_received(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// A dispatch panicked or was cancelled.
    pub fn dispatch_failed(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self, engine_mode: &'static str, jobs: JobCounts) -> HealthSnapshot {
        HealthSnapshot {
            status: "healthy",
            version: crate::VERSION,
            uptime_secs: self.uptime().as_secs(),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            engine_mode,
            jobs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let health = ServerHealth::new();
        health.connection_opened();
        health.connection_opened();
        health.connection_closed();
        health.request_received();
        health.protocol_error();

        let snapshot = health.snapshot("simulated", JobCounts::default());
        assert_eq!(snapshot.connections_total, 2);
        assert_eq!(snapshot.connections_active, 1);
        assert_eq!(snapshot.requests, 1);
        assert_eq!(snapshot.protocol_errors, 1);
        assert_eq!(snapshot.dispatch_failures, 0);
        assert_eq!(snapshot.status, "healthy");
        assert_eq!(snapshot.version, crate::VERSION);
    }
}
