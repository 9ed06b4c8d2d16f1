use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Run-wide counters. Sessions only ever increment them; the reporter reads
/// them once every session has settled.
#[derive(Debug)]
pub struct Metrics {
    connected_clients: AtomicU64,
    failed_clients: AtomicU64,
    messages_received: AtomicU64,
    errors: AtomicU64,
    started: Instant,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub connected_clients: u64,
    pub failed_clients: u64,
    pub messages_received: u64,
    pub errors: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connected_clients: AtomicU64::new(0),
            failed_clients: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn client_connected(&self) {
        self.connected_clients.fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_failed(&self) {
        self.failed_clients.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) -> u64 {
        self.messages_received.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connected_clients: self.connected_clients.load(Ordering::Relaxed),
            failed_clients: self.failed_clients.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            started_at: self.started_at,
            elapsed_secs: self.started.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters_from_many_threads() {
        let metrics = Arc::new(Metrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    metrics.client_connected();
                    for _ in 0..250 {
                        metrics.message_received();
                    }
                    metrics.error();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        metrics.client_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connected_clients, 4);
        assert_eq!(snapshot.failed_clients, 1);
        assert_eq!(snapshot.messages_received, 1_000);
        assert_eq!(snapshot.errors, 4);
        assert!(snapshot.elapsed_secs >= 0.0);
        assert!(snapshot.started_at <= Utc::now());
    }
}
