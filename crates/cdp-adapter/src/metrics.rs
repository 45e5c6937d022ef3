use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{
    core::Collector, histogram_opts, Encoder, HistogramVec, IntCounter, IntCounterVec, Registry,
    TextEncoder,
};
use serde::Serialize;
use tracing::error;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AdapterMetricsSnapshot {
    pub commands: u64,
    pub command_success: u64,
    pub command_failures: u64,
    pub command_latency_total_us: u64,
    pub heartbeat_failures: u64,
}

static COMMANDS: AtomicU64 = AtomicU64::new(0);
static COMMAND_SUCCESS: AtomicU64 = AtomicU64::new(0);
static COMMAND_FAILURES: AtomicU64 = AtomicU64::new(0);
static COMMAND_LATENCY_TOTAL_US: AtomicU64 = AtomicU64::new(0);
static HEARTBEAT_FAILURES: AtomicU64 = AtomicU64::new(0);

lazy_static! {
    static ref REGISTRY: Registry = {
        let registry = Registry::new();
        register(&registry, CDP_COMMANDS_TOTAL.clone());
        register(&registry, CDP_COMMAND_FAILURES_TOTAL.clone());
        register(&registry, CDP_COMMAND_DURATION.clone());
        register(&registry, CDP_HEARTBEAT_FAILURES_TOTAL.clone());
        registry
    };
    static ref CDP_COMMANDS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("chatflow_cdp_commands_total", "Total CDP commands executed"),
        &["method"]
    )
    .unwrap();
    static ref CDP_COMMAND_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "chatflow_cdp_command_failures_total",
            "Total CDP command failures"
        ),
        &["method"]
    )
    .unwrap();
    static ref CDP_COMMAND_DURATION: HistogramVec = HistogramVec::new(
        histogram_opts!(
            "chatflow_cdp_command_duration_seconds",
            "CDP command latency",
            vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]
        ),
        &["method"]
    )
    .unwrap();
    static ref CDP_HEARTBEAT_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "chatflow_cdp_heartbeat_failures_total",
        "Heartbeats that failed or timed out"
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector)) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register cdp metric");
        }
    }
}

pub fn record_command(method: &str) {
    COMMANDS.fetch_add(1, Ordering::Relaxed);
    CDP_COMMANDS_TOTAL.with_label_values(&[method]).inc();
}

pub fn record_command_success(method: &str, duration: Duration) {
    COMMAND_SUCCESS.fetch_add(1, Ordering::Relaxed);
    let micros = duration.as_micros().min(u64::MAX as u128) as u64;
    COMMAND_LATENCY_TOTAL_US.fetch_add(micros, Ordering::Relaxed);
    CDP_COMMAND_DURATION
        .with_label_values(&[method])
        .observe(duration.as_secs_f64());
}

pub fn record_command_failure(method: &str) {
    COMMAND_FAILURES.fetch_add(1, Ordering::Relaxed);
    CDP_COMMAND_FAILURES_TOTAL
        .with_label_values(&[method])
        .inc();
}

pub fn record_heartbeat_failure() {
    HEARTBEAT_FAILURES.fetch_add(1, Ordering::Relaxed);
    CDP_HEARTBEAT_FAILURES_TOTAL.inc();
}

pub fn snapshot() -> AdapterMetricsSnapshot {
    AdapterMetricsSnapshot {
        commands: COMMANDS.load(Ordering::Relaxed),
        command_success: COMMAND_SUCCESS.load(Ordering::Relaxed),
        command_failures: COMMAND_FAILURES.load(Ordering::Relaxed),
        command_latency_total_us: COMMAND_LATENCY_TOTAL_US.load(Ordering::Relaxed),
        heartbeat_failures: HEARTBEAT_FAILURES.load(Ordering::Relaxed),
    }
}

/// Prometheus text exposition of every adapter collector.
pub fn encode_text() -> String {
    let mut buffer = Vec::new();
    if let Err(err) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        error!(?err, "failed to encode cdp metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
