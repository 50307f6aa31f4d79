//! Traffic accounting.
//!
//! Counters are incremented from the transport's I/O path, which may be a
//! different thread than the session's serial context, so they are atomics:
//! accounting must never block or lose increments under concurrent send and
//! receive. `freeze` is called exactly once, by `stop`; recording after the
//! freeze is a caller defect and panics.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::types::{CallStats, NetworkClass};

/// Accumulates byte counters split by network class.
#[derive(Debug, Default)]
pub struct TelemetryCollector {
    sent_wifi: AtomicU64,
    received_wifi: AtomicU64,
    sent_mobile: AtomicU64,
    received_mobile: AtomicU64,
    frozen: AtomicBool,
}

impl TelemetryCollector {
    /// Create a collector with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record bytes sent on the given network class.
    ///
    /// # Panics
    ///
    /// Panics if the collector is already frozen.
    pub fn record_sent(&self, bytes: u64, class: NetworkClass) {
        self.assert_live();
        match class {
            NetworkClass::Wifi => self.sent_wifi.fetch_add(bytes, Ordering::Relaxed),
            NetworkClass::Mobile => self.sent_mobile.fetch_add(bytes, Ordering::Relaxed),
        };
    }

    /// Record bytes received on the given network class.
    ///
    /// # Panics
    ///
    /// Panics if the collector is already frozen.
    pub fn record_received(&self, bytes: u64, class: NetworkClass) {
        self.assert_live();
        match class {
            NetworkClass::Wifi => self.received_wifi.fetch_add(bytes, Ordering::Relaxed),
            NetworkClass::Mobile => self.received_mobile.fetch_add(bytes, Ordering::Relaxed),
        };
    }

    /// Current totals as `(sent, received)` across both classes.
    pub fn totals(&self) -> (u64, u64) {
        (
            self.sent_wifi.load(Ordering::Relaxed) + self.sent_mobile.load(Ordering::Relaxed),
            self.received_wifi.load(Ordering::Relaxed)
                + self.received_mobile.load(Ordering::Relaxed),
        )
    }

    /// Freeze the counters into the final report.
    ///
    /// # Panics
    ///
    /// Panics if called twice; `stop()` is the only caller and is
    /// idempotent above this layer.
    pub fn freeze(&self, debug_log: String) -> CallStats {
        let was_frozen = self.frozen.swap(true, Ordering::SeqCst);
        assert!(!was_frozen, "telemetry collector frozen twice");

        CallStats {
            debug_log,
            bytes_sent_wifi: self.sent_wifi.load(Ordering::SeqCst),
            bytes_received_wifi: self.received_wifi.load(Ordering::SeqCst),
            bytes_sent_mobile: self.sent_mobile.load(Ordering::SeqCst),
            bytes_received_mobile: self.received_mobile.load(Ordering::SeqCst),
        }
    }

    fn assert_live(&self) {
        assert!(
            !self.frozen.load(Ordering::SeqCst),
            "telemetry recorded after freeze"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn splits_by_network_class() {
        let collector = TelemetryCollector::new();
        collector.record_sent(100, NetworkClass::Wifi);
        collector.record_sent(40, NetworkClass::Mobile);
        collector.record_received(7, NetworkClass::Mobile);

        let stats = collector.freeze("log".into());
        assert_eq!(stats.bytes_sent_wifi, 100);
        assert_eq!(stats.bytes_sent_mobile, 40);
        assert_eq!(stats.bytes_received_wifi, 0);
        assert_eq!(stats.bytes_received_mobile, 7);
        assert_eq!(stats.debug_log, "log");
    }

    #[test]
    fn counters_are_monotonic_under_concurrency() {
        let collector = Arc::new(TelemetryCollector::new());
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let collector = collector.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        collector.record_sent(1, NetworkClass::Wifi);
                        collector.record_received(2, NetworkClass::Mobile);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let (sent, received) = collector.totals();
        assert_eq!(sent, 4000);
        assert_eq!(received, 8000);
    }

    #[test]
    #[should_panic(expected = "telemetry recorded after freeze")]
    fn recording_after_freeze_is_a_defect() {
        let collector = TelemetryCollector::new();
        let _ = collector.freeze(String::new());
        collector.record_sent(1, NetworkClass::Wifi);
    }

    #[test]
    #[should_panic(expected = "frozen twice")]
    fn double_freeze_is_a_defect() {
        let collector = TelemetryCollector::new();
        let _ = collector.freeze(String::new());
        let _ = collector.freeze(String::new());
    }
}
