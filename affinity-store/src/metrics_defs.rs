//! Metrics definitions for the affinity store.

use shared::metrics_defs::{MetricDef, MetricType};

pub const STORE_AUTH_REQUESTS: MetricDef = MetricDef {
    name: "affinity_store.auth.requests",
    metric_type: MetricType::Counter,
    description: "Authentication requests sent to the store. Tagged with outcome.",
};

pub const STORE_REQUEST_FAILURES: MetricDef = MetricDef {
    name: "affinity_store.request.failures",
    metric_type: MetricType::Counter,
    description: "Store operations that failed. Tagged with op.",
};

pub const ALL_METRICS: &[MetricDef] = &[STORE_AUTH_REQUESTS, STORE_REQUEST_FAILURES];
