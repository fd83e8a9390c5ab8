//! # Prometheus Metrics
//!
//! Invocation counters and latencies of the development node, scraped at
//! `/metrics`. Everything lives in a dedicated [`prometheus::Registry`]
//! with the `ledger` prefix.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Metric handles of one node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Invocations by entry point (`init`, `invoke`, `query`) and outcome
    /// (`ok`, `error`).
    pub invocations_total: IntCounterVec,
    /// Wall-clock time of one invocation, commit included.
    pub invocation_latency_seconds: HistogramVec,
    /// State keys written by committed transactions.
    pub committed_writes_total: IntCounter,
    /// Sequence number of the last committed transaction.
    pub last_sequence: IntGauge,
}

impl NodeMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("ledger".into()), None)?;

        let invocations_total = IntCounterVec::new(
            Opts::new("invocations_total", "Chaincode invocations by entry point and outcome"),
            &["entry", "outcome"],
        )?;
        registry.register(Box::new(invocations_total.clone()))?;

        let invocation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "invocation_latency_seconds",
                "Chaincode invocation latency in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
            &["entry"],
        )?;
        registry.register(Box::new(invocation_latency_seconds.clone()))?;

        let committed_writes_total = IntCounter::new(
            "committed_writes_total",
            "State keys written by committed transactions",
        )?;
        registry.register(Box::new(committed_writes_total.clone()))?;

        let last_sequence = IntGauge::new(
            "last_sequence",
            "Sequence number of the last committed transaction",
        )?;
        registry.register(Box::new(last_sequence.clone()))?;

        Ok(Self {
            registry,
            invocations_total,
            invocation_latency_seconds,
            committed_writes_total,
            last_sequence,
        })
    }

    /// Records one finished invocation.
    pub fn observe(&self, entry: &str, ok: bool, seconds: f64, committed_keys: usize) {
        let outcome = if ok { "ok" } else { "error" };
        self.invocations_total.with_label_values(&[entry, outcome]).inc();
        self.invocation_latency_seconds
            .with_label_values(&[entry])
            .observe(seconds);
        self.committed_writes_total.inc_by(committed_keys as u64);
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// Renders `/metrics`.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observations_show_up_in_the_exposition() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.observe("invoke", true, 0.002, 3);
        metrics.observe("invoke", false, 0.001, 0);
        metrics.last_sequence.set(7);

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"ledger_invocations_total{entry="invoke",outcome="ok"} 1"#));
        assert!(text.contains(r#"ledger_invocations_total{entry="invoke",outcome="error"} 1"#));
        assert!(text.contains("ledger_committed_writes_total 3"));
        assert!(text.contains("ledger_last_sequence 7"));
    }
}
