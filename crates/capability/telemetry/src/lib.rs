//! 追踪初始化、会话 ID 与进程级计数指标。

use serde::Serialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 指标快照（`/metrics` 输出）。
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MetricsSnapshot {
    pub connections_accepted: u64,
    pub connections_rejected: u64,
    pub frames_decoded: u64,
    pub frames_malformed: u64,
    pub records_decoded: u64,
    pub records_rejected: u64,
    pub batches_enqueued: u64,
    pub batches_ingested: u64,
    pub batch_failures: u64,
    pub positions_written: u64,
    pub engine_events_written: u64,
    pub stop_events_opened: u64,
    pub stop_events_closed: u64,
    pub motion_transitions: u64,
    pub sweep_promotions: u64,
}

/// 进程级计数指标。
pub struct TelemetryMetrics {
    connections_accepted: AtomicU64,
    connections_rejected: AtomicU64,
    frames_decoded: AtomicU64,
    frames_malformed: AtomicU64,
    records_decoded: AtomicU64,
    records_rejected: AtomicU64,
    batches_enqueued: AtomicU64,
    batches_ingested: AtomicU64,
    batch_failures: AtomicU64,
    positions_written: AtomicU64,
    engine_events_written: AtomicU64,
    stop_events_opened: AtomicU64,
    stop_events_closed: AtomicU64,
    motion_transitions: AtomicU64,
    sweep_promotions: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            connections_accepted: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            frames_decoded: AtomicU64::new(0),
            frames_malformed: AtomicU64::new(0),
            records_decoded: AtomicU64::new(0),
            records_rejected: AtomicU64::new(0),
            batches_enqueued: AtomicU64::new(0),
            batches_ingested: AtomicU64::new(0),
            batch_failures: AtomicU64::new(0),
            positions_written: AtomicU64::new(0),
            engine_events_written: AtomicU64::new(0),
            stop_events_opened: AtomicU64::new(0),
            stop_events_closed: AtomicU64::new(0),
            motion_transitions: AtomicU64::new(0),
            sweep_promotions: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            records_decoded: self.records_decoded.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            batches_enqueued: self.batches_enqueued.load(Ordering::Relaxed),
            batches_ingested: self.batches_ingested.load(Ordering::Relaxed),
            batch_failures: self.batch_failures.load(Ordering::Relaxed),
            positions_written: self.positions_written.load(Ordering::Relaxed),
            engine_events_written: self.engine_events_written.load(Ordering::Relaxed),
            stop_events_opened: self.stop_events_opened.load(Ordering::Relaxed),
            stop_events_closed: self.stop_events_closed.load(Ordering::Relaxed),
            motion_transitions: self.motion_transitions.load(Ordering::Relaxed),
            sweep_promotions: self.sweep_promotions.load(Ordering::Relaxed),
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

/// 初始化 tracing（默认 info，可由 RUST_LOG 覆盖）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 TCP 会话 ID。
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录已接受连接（IMEI 握手成功）。
pub fn record_connection_accepted() {
    metrics().connections_accepted.fetch_add(1, Ordering::Relaxed);
}

/// 记录被拒绝连接（未知 IMEI）。
pub fn record_connection_rejected() {
    metrics().connections_rejected.fetch_add(1, Ordering::Relaxed);
}

/// 记录成功解码的帧及其记录数。
pub fn record_frame_decoded(records: usize) {
    let metrics = metrics();
    metrics.frames_decoded.fetch_add(1, Ordering::Relaxed);
    metrics
        .records_decoded
        .fetch_add(records as u64, Ordering::Relaxed);
}

/// 记录解码失败的帧。
pub fn record_frame_malformed() {
    metrics().frames_malformed.fetch_add(1, Ordering::Relaxed);
}

/// 记录校验未通过的记录数。
pub fn record_records_rejected(count: usize) {
    metrics()
        .records_rejected
        .fetch_add(count as u64, Ordering::Relaxed);
}

/// 记录入队批次。
pub fn record_batch_enqueued() {
    metrics().batches_enqueued.fetch_add(1, Ordering::Relaxed);
}

/// 记录处理完成的批次。
pub fn record_batch_ingested() {
    metrics().batches_ingested.fetch_add(1, Ordering::Relaxed);
}

/// 记录重试耗尽的批次。
pub fn record_batch_failure() {
    metrics().batch_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入的定位行与发动机事件数。
pub fn record_rows_written(positions: usize, engine_events: usize) {
    let metrics = metrics();
    metrics
        .positions_written
        .fetch_add(positions as u64, Ordering::Relaxed);
    metrics
        .engine_events_written
        .fetch_add(engine_events as u64, Ordering::Relaxed);
}

/// 记录开启的停车区间。
pub fn record_stop_event_opened() {
    metrics().stop_events_opened.fetch_add(1, Ordering::Relaxed);
}

/// 记录关闭的停车区间。
pub fn record_stop_event_closed() {
    metrics().stop_events_closed.fetch_add(1, Ordering::Relaxed);
}

/// 记录运动状态变化。
pub fn record_motion_transition() {
    metrics().motion_transitions.fetch_add(1, Ordering::Relaxed);
}

/// 记录巡检触发的超时升级。
pub fn record_sweep_promotion() {
    metrics().sweep_promotions.fetch_add(1, Ordering::Relaxed);
}
