//! 运行配置到各能力模块参数的转换。

use fleet_config::AppConfig;
use fleet_ingest::QueueConfig;
use fleet_motion::MotionConfig;
use fleet_pipeline::IngestConfig;
use fleet_protocol::TcpServerConfig;
use std::time::Duration;

pub fn tcp_config(config: &AppConfig) -> TcpServerConfig {
    TcpServerConfig {
        max_connections: config.tcp_max_connections,
        idle_timeout: Duration::from_secs(config.tcp_idle_timeout_seconds),
        max_frame_bytes: config.tcp_max_frame_bytes,
    }
}

pub fn queue_config(config: &AppConfig) -> QueueConfig {
    QueueConfig {
        partitions: config.queue_partitions,
        max_retries: config.queue_max_retries,
        backoff_ms: config.queue_backoff_ms,
        key_prefix: config.queue_key_prefix.clone(),
        ..QueueConfig::default()
    }
}

pub fn ingest_config(config: &AppConfig) -> IngestConfig {
    IngestConfig {
        epoch_floor_ms: config.record_epoch_floor_ms,
        max_future_ms: config.record_max_future_ms,
        max_jump_meters: config.max_jump_meters,
        engine_debounce_ms: seconds_to_ms(config.engine_debounce_seconds),
    }
}

pub fn motion_config(config: &AppConfig) -> MotionConfig {
    MotionConfig {
        speed_threshold_kmh: config.motion_speed_threshold_kmh,
        distance_threshold_m: config.motion_distance_threshold_m,
        stop_threshold_ms: seconds_to_ms(config.motion_stop_threshold_seconds),
        parking_threshold_ms: seconds_to_ms(config.motion_parking_threshold_seconds),
    }
}

pub fn sweep_interval(config: &AppConfig) -> Duration {
    Duration::from_secs(config.motion_sweep_interval_seconds.max(1))
}

fn seconds_to_ms(seconds: u64) -> i64 {
    i64::try_from(seconds)
        .unwrap_or(i64::MAX)
        .saturating_mul(1000)
}
