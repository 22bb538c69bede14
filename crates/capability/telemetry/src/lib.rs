//! 追踪、请求 ID 生成与采集计数。

use serde::Serialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 采集指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub payloads_received: u64,
    pub readings_produced: u64,
    pub readings_persisted: u64,
    pub write_failures: u64,
    pub parse_errors: u64,
    pub dropped_after_stop: u64,
    pub reconnects_scheduled: u64,
    pub connector_starts: u64,
    pub write_latency_ms_total: u64,
    pub write_latency_ms_count: u64,
}

/// 进程级采集指标。
pub struct TelemetryMetrics {
    payloads_received: AtomicU64,
    readings_produced: AtomicU64,
    readings_persisted: AtomicU64,
    write_failures: AtomicU64,
    parse_errors: AtomicU64,
    dropped_after_stop: AtomicU64,
    reconnects_scheduled: AtomicU64,
    connector_starts: AtomicU64,
    write_latency_ms_total: AtomicU64,
    write_latency_ms_count: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            payloads_received: AtomicU64::new(0),
            readings_produced: AtomicU64::new(0),
            readings_persisted: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            dropped_after_stop: AtomicU64::new(0),
            reconnects_scheduled: AtomicU64::new(0),
            connector_starts: AtomicU64::new(0),
            write_latency_ms_total: AtomicU64::new(0),
            write_latency_ms_count: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            payloads_received: self.payloads_received.load(Ordering::Relaxed),
            readings_produced: self.readings_produced.load(Ordering::Relaxed),
            readings_persisted: self.readings_persisted.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            dropped_after_stop: self.dropped_after_stop.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            connector_starts: self.connector_starts.load(Ordering::Relaxed),
            write_latency_ms_total: self.write_latency_ms_total.load(Ordering::Relaxed),
            write_latency_ms_count: self.write_latency_ms_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info，可由 `RUST_LOG` 覆盖）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录连接器收到的原始负载次数。
pub fn record_payload() {
    metrics().payloads_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录规整产出的读数数量。
pub fn record_readings_produced(count: u64) {
    metrics()
        .readings_produced
        .fetch_add(count, Ordering::Relaxed);
}

/// 记录成功持久化的读数数量。
pub fn record_readings_persisted(count: u64) {
    metrics()
        .readings_persisted
        .fetch_add(count, Ordering::Relaxed);
}

/// 记录写入失败次数。
pub fn record_write_failure() {
    metrics().write_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录负载解析失败（产生诊断读数）次数。
pub fn record_parse_error() {
    metrics().parse_errors.fetch_add(1, Ordering::Relaxed);
}

/// 记录停止后丢弃的读数数量。
pub fn record_dropped_after_stop(count: u64) {
    metrics()
        .dropped_after_stop
        .fetch_add(count, Ordering::Relaxed);
}

/// 记录已调度的重连次数。
pub fn record_reconnect_scheduled() {
    metrics()
        .reconnects_scheduled
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录连接器成功启动次数。
pub fn record_connector_start() {
    metrics().connector_starts.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入延迟（毫秒）。
pub fn record_write_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .write_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .write_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}
