//! Observability infrastructure for commit class resolution
//!
//! Provides:
//! - Prometheus metrics (snapshot size, watch events, resolution outcomes and latency)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for resolution latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<CommitMetricsInner> = OnceLock::new();

struct CommitMetricsInner {
    replica_objects: IntGauge,
    watch_events: IntCounterVec,
    watch_errors: IntCounter,
    resolutions: IntCounterVec,
    resolution_latency_seconds: Histogram,
}

impl CommitMetricsInner {
    fn new() -> Self {
        Self {
            replica_objects: register_int_gauge!(
                "commitclass_replica_objects",
                "Number of CommitClass objects in the local snapshot"
            )
            .expect("Failed to register replica_objects"),

            watch_events: register_int_counter_vec!(
                "commitclass_watch_events_total",
                "Watch events applied to the local snapshot",
                &["event"]
            )
            .expect("Failed to register watch_events"),

            watch_errors: register_int_counter!(
                "commitclass_watch_errors_total",
                "Errors reported by the CommitClass watch stream"
            )
            .expect("Failed to register watch_errors"),

            resolutions: register_int_counter_vec!(
                "commitclass_resolutions_total",
                "Commit settings resolutions by outcome",
                &["outcome"]
            )
            .expect("Failed to register resolutions"),

            resolution_latency_seconds: register_histogram!(
                "commitclass_resolution_latency_seconds",
                "Time spent resolving commit settings for a node",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register resolution_latency_seconds"),
        }
    }
}

/// Resolution outcome label values
pub mod outcomes {
    pub const MATCHED: &str = "matched";
    pub const UNMATCHED: &str = "unmatched";
    pub const ERROR: &str = "error";
}

/// Watch event label values
pub mod events {
    pub const APPLIED: &str = "applied";
    pub const DELETED: &str = "deleted";
    pub const RESTARTED: &str = "restarted";
}

/// Lightweight handle to the global commit class metrics
///
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct CommitMetrics {
    _private: (),
}

impl Default for CommitMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(CommitMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &CommitMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn set_replica_objects(&self, count: usize) {
        self.inner().replica_objects.set(count as i64);
    }

    pub fn inc_watch_event(&self, event: &str) {
        self.inner().watch_events.with_label_values(&[event]).inc();
    }

    pub fn inc_watch_errors(&self) {
        self.inner().watch_errors.inc();
    }

    pub fn inc_resolution(&self, outcome: &str) {
        self.inner().resolutions.with_label_values(&[outcome]).inc();
    }

    pub fn observe_resolution_latency(&self, duration_secs: f64) {
        self.inner().resolution_latency_seconds.observe(duration_secs);
    }
}

/// Structured logger for agent lifecycle and resolution events
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn log_startup(&self, version: &str, resource: &str) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            resource = %resource,
            "Commit class agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Commit class agent shutting down"
        );
    }

    /// Log the outcome of a resolution
    pub fn log_resolution(&self, commit_class: Option<&str>, factors: &[(&str, f64)]) {
        match commit_class {
            Some(class) => info!(
                event = "commit_settings_resolved",
                node = %self.node_name,
                commit_class = %class,
                factors = ?factors,
                "Resolved commit settings"
            ),
            None => debug!(
                event = "commit_settings_resolved",
                node = %self.node_name,
                "No CommitClass matches node, resources unscaled"
            ),
        }
    }

    pub fn log_resolution_failure(&self, error: &str) {
        warn!(
            event = "commit_settings_failed",
            node = %self.node_name,
            error = %error,
            "Failed to resolve commit settings, falling back to unscaled resources"
        );
    }
}
