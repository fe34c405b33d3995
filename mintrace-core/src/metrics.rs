use crate::types::{Rejection, Source};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

/// Counters for one ingestion adapter
#[derive(Debug)]
pub struct Metrics {
    pub source: Source,
    /// Raw messages received from the upstream transport
    pub messages_total: AtomicU64,
    /// Events that passed program-match verification
    pub events_matched: AtomicU64,
    /// Observations written to the log
    pub observations_recorded: AtomicU64,
    /// Appends the store refused
    pub storage_failures: AtomicU64,
    /// Dropped messages by rejection label
    pub rejections: Mutex<BTreeMap<&'static str, u64>>,
    /// Number of reconnections
    pub reconnections: AtomicU64,
    /// Number of RPC calls made
    pub rpc_calls: AtomicU64,
    /// Number of RPC call failures
    pub rpc_failures: AtomicU64,
    /// Processing start time
    pub start_time: Instant,
}

impl Metrics {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            messages_total: AtomicU64::new(0),
            events_matched: AtomicU64::new(0),
            observations_recorded: AtomicU64::new(0),
            storage_failures: AtomicU64::new(0),
            rejections: Mutex::new(BTreeMap::new()),
            reconnections: AtomicU64::new(0),
            rpc_calls: AtomicU64::new(0),
            rpc_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_message(&self) {
        self.messages_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_match(&self) {
        self.events_matched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_observation(&self, failed: bool) {
        if failed {
            self.storage_failures.fetch_add(1, Ordering::Relaxed);
        } else {
            self.observations_recorded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rejection(&self, rejection: &Rejection) {
        if let Ok(mut map) = self.rejections.lock() {
            *map.entry(rejection.label()).or_insert(0) += 1;
        }
    }

    pub fn record_reconnection(&self) {
        self.reconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rpc_call(&self, failed: bool) {
        self.rpc_calls.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.rpc_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let rejections = self
            .rejections
            .lock()
            .map(|map| map.iter().map(|(k, v)| (k.to_string(), *v)).collect())
            .unwrap_or_default();

        MetricsSnapshot {
            source: self.source,
            messages_total: self.messages_total.load(Ordering::Relaxed),
            events_matched: self.events_matched.load(Ordering::Relaxed),
            observations_recorded: self.observations_recorded.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
            rejections,
            reconnections: self.reconnections.load(Ordering::Relaxed),
            rpc_calls: self.rpc_calls.load(Ordering::Relaxed),
            rpc_failures: self.rpc_failures.load(Ordering::Relaxed),
            uptime_seconds: self.uptime_seconds(),
        }
    }

    /// Log current metrics summary
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        info!(
            "[{}] {} messages, {} matched, {} recorded ({} storage failures), {} reconnections, {} RPC calls ({} failed), up {}s",
            snapshot.source,
            snapshot.messages_total,
            snapshot.events_matched,
            snapshot.observations_recorded,
            snapshot.storage_failures,
            snapshot.reconnections,
            snapshot.rpc_calls,
            snapshot.rpc_failures,
            snapshot.uptime_seconds
        );
        debug!("[{}] Rejections: {:?}", snapshot.source, snapshot.rejections);
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub source: Source,
    pub messages_total: u64,
    pub events_matched: u64,
    pub observations_recorded: u64,
    pub storage_failures: u64,
    pub rejections: BTreeMap<String, u64>,
    pub reconnections: u64,
    pub rpc_calls: u64,
    pub rpc_failures: u64,
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    /// Export as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "source": self.source,
            "messages_total": self.messages_total,
            "events_matched": self.events_matched,
            "observations_recorded": self.observations_recorded,
            "storage_failures": self.storage_failures,
            "rejections": self.rejections,
            "reconnections": self.reconnections,
            "rpc_calls": self.rpc_calls,
            "rpc_failures": self.rpc_failures,
            "uptime_seconds": self.uptime_seconds,
        })
    }
}

/// Health check status
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check for one adapter
pub struct HealthCheck {
    metrics: Arc<Metrics>,
    max_reconnections: u64,
    max_failure_rate: f64,
}

impl HealthCheck {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            max_reconnections: 10,
            max_failure_rate: 0.5,
        }
    }

    /// Configure max reconnections before marking as degraded
    pub fn with_max_reconnections(mut self, max: u64) -> Self {
        self.max_reconnections = max;
        self
    }

    /// Configure max RPC failure rate before marking as degraded
    pub fn with_max_failure_rate(mut self, rate: f64) -> Self {
        self.max_failure_rate = rate;
        self
    }

    /// Check current health status
    pub fn check(&self) -> HealthStatus {
        let reconnections = self.metrics.reconnections.load(Ordering::Relaxed);
        let rpc_calls = self.metrics.rpc_calls.load(Ordering::Relaxed);
        let rpc_failures = self.metrics.rpc_failures.load(Ordering::Relaxed);
        let recorded = self.metrics.observations_recorded.load(Ordering::Relaxed);
        let storage_failures = self.metrics.storage_failures.load(Ordering::Relaxed);

        if reconnections > self.max_reconnections * 2 {
            return HealthStatus::Unhealthy;
        }

        // Every write failing means nothing is being measured
        if storage_failures > 0 && recorded == 0 {
            return HealthStatus::Unhealthy;
        }

        if rpc_calls > 0 {
            let failure_rate = rpc_failures as f64 / rpc_calls as f64;
            if failure_rate > self.max_failure_rate {
                return HealthStatus::Degraded;
            }
        }

        if reconnections > self.max_reconnections {
            return HealthStatus::Degraded;
        }

        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new(Source::Grpc);
        assert_eq!(metrics.messages_total.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.uptime_seconds(), 0);
    }

    #[test]
    fn test_record_rejections_by_label() {
        let metrics = Metrics::new(Source::Wss);
        metrics.record_rejection(&Rejection::NotProgramMatch);
        metrics.record_rejection(&Rejection::NotProgramMatch);
        metrics.record_rejection(&Rejection::MissingField("meta"));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rejections.get("not_program_match"), Some(&2));
        assert_eq!(snapshot.rejections.get("missing_field"), Some(&1));
        assert_eq!(snapshot.to_json()["source"], "wss");
    }

    #[test]
    fn test_record_observation() {
        let metrics = Metrics::new(Source::Grpc);
        metrics.record_observation(false);
        metrics.record_observation(true);
        assert_eq!(metrics.observations_recorded.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.storage_failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_health_check_healthy() {
        let metrics = Arc::new(Metrics::new(Source::Grpc));
        assert_eq!(HealthCheck::new(metrics).check(), HealthStatus::Healthy);
    }

    #[test]
    fn test_health_check_degraded_reconnections() {
        let metrics = Arc::new(Metrics::new(Source::Wss));
        metrics.reconnections.store(15, Ordering::Relaxed);
        let health = HealthCheck::new(metrics).with_max_reconnections(10);
        assert_eq!(health.check(), HealthStatus::Degraded);
    }

    #[test]
    fn test_health_check_unhealthy_reconnections() {
        let metrics = Arc::new(Metrics::new(Source::Wss));
        metrics.reconnections.store(25, Ordering::Relaxed);
        let health = HealthCheck::new(metrics).with_max_reconnections(10);
        assert_eq!(health.check(), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_health_check_storage_failures() {
        let metrics = Arc::new(Metrics::new(Source::Grpc));
        metrics.record_observation(true);
        assert_eq!(HealthCheck::new(metrics).check(), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_health_check_failure_rate() {
        let metrics = Arc::new(Metrics::new(Source::Wss));
        metrics.rpc_calls.store(100, Ordering::Relaxed);
        metrics.rpc_failures.store(60, Ordering::Relaxed);
        let health = HealthCheck::new(metrics).with_max_failure_rate(0.5);
        assert_eq!(health.check(), HealthStatus::Degraded);
    }
}
