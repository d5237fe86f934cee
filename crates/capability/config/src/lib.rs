//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 工作队列后端。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    /// Redis 列表（持久、至少一次投递）
    Redis,
    /// 进程内分区通道（开发/测试）
    Memory,
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: String,
    pub tcp_addr: String,
    pub http_addr: String,
    pub tcp_max_connections: usize,
    pub tcp_idle_timeout_seconds: u64,
    pub tcp_max_frame_bytes: usize,
    pub queue_backend: QueueBackend,
    pub queue_partitions: usize,
    pub queue_max_retries: u64,
    pub queue_backoff_ms: u64,
    pub queue_key_prefix: String,
    pub record_epoch_floor_ms: i64,
    pub record_max_future_ms: i64,
    pub max_jump_meters: f64,
    pub engine_debounce_seconds: u64,
    pub motion_speed_threshold_kmh: f64,
    pub motion_distance_threshold_m: f64,
    pub motion_stop_threshold_seconds: u64,
    pub motion_parking_threshold_seconds: u64,
    pub motion_sweep_interval_seconds: u64,
    pub motion_key_prefix: String,
    pub live_channel_prefix: String,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("FLEET_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("FLEET_DATABASE_URL".to_string()))?;
        let redis_url =
            env::var("FLEET_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let tcp_addr = env::var("FLEET_TCP_ADDR").unwrap_or_else(|_| "0.0.0.0:5027".to_string());
        let http_addr =
            env::var("FLEET_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let tcp_max_connections = read_usize_with_default("FLEET_TCP_MAX_CONNECTIONS", 1000)?;
        let tcp_idle_timeout_seconds =
            read_u64_with_default("FLEET_TCP_IDLE_TIMEOUT_SECONDS", 300)?;
        let tcp_max_frame_bytes = read_usize_with_default("FLEET_TCP_MAX_FRAME_BYTES", 65_536)?;
        let queue_backend = read_queue_backend("FLEET_QUEUE_BACKEND")?;
        let queue_partitions = read_usize_with_default("FLEET_QUEUE_PARTITIONS", 8)?.max(1);
        let queue_max_retries = read_u64_with_default("FLEET_QUEUE_MAX_RETRIES", 3)?;
        let queue_backoff_ms = read_u64_with_default("FLEET_QUEUE_BACKOFF_MS", 500)?;
        let queue_key_prefix = env::var("FLEET_QUEUE_KEY_PREFIX")
            .unwrap_or_else(|_| "queue:gps-position".to_string());
        let record_epoch_floor_ms =
            read_i64_with_default("FLEET_RECORD_EPOCH_FLOOR_MS", 1_767_225_600_000)?;
        let record_max_future_ms = read_i64_with_default("FLEET_RECORD_MAX_FUTURE_MS", 3_600_000)?;
        let max_jump_meters = read_f64_with_default("FLEET_MAX_JUMP_METERS", 5_000.0)?;
        let engine_debounce_seconds = read_u64_with_default("FLEET_ENGINE_DEBOUNCE_SECONDS", 30)?;
        let motion_speed_threshold_kmh =
            read_f64_with_default("FLEET_MOTION_SPEED_THRESHOLD_KMH", 10.0)?;
        let motion_distance_threshold_m =
            read_f64_with_default("FLEET_MOTION_DISTANCE_THRESHOLD_M", 50.0)?;
        let motion_stop_threshold_seconds =
            read_u64_with_default("FLEET_MOTION_STOP_THRESHOLD_SECONDS", 120)?;
        let motion_parking_threshold_seconds =
            read_u64_with_default("FLEET_MOTION_PARKING_THRESHOLD_SECONDS", 180)?;
        let motion_sweep_interval_seconds =
            read_u64_with_default("FLEET_MOTION_SWEEP_INTERVAL_SECONDS", 60)?.max(1);
        let motion_key_prefix =
            env::var("FLEET_MOTION_KEY_PREFIX").unwrap_or_else(|_| "motion".to_string());
        let live_channel_prefix =
            env::var("FLEET_LIVE_CHANNEL_PREFIX").unwrap_or_else(|_| "tracking".to_string());

        Ok(Self {
            database_url,
            redis_url,
            tcp_addr,
            http_addr,
            tcp_max_connections,
            tcp_idle_timeout_seconds,
            tcp_max_frame_bytes,
            queue_backend,
            queue_partitions,
            queue_max_retries,
            queue_backoff_ms,
            queue_key_prefix,
            record_epoch_floor_ms,
            record_max_future_ms,
            max_jump_meters,
            engine_debounce_seconds,
            motion_speed_threshold_kmh,
            motion_distance_threshold_m,
            motion_stop_threshold_seconds,
            motion_parking_threshold_seconds,
            motion_sweep_interval_seconds,
            motion_key_prefix,
            live_channel_prefix,
        })
    }
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_i64_with_default(key: &str, default: i64) -> Result<i64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<i64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<usize>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_f64_with_default(key: &str, default: f64) -> Result<f64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && parsed >= 0.0 => Ok(parsed),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

fn read_queue_backend(key: &str) -> Result<QueueBackend, ConfigError> {
    match env::var(key) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "redis" => Ok(QueueBackend::Redis),
            "memory" => Ok(QueueBackend::Memory),
            _ => Err(ConfigError::Invalid(key.to_string(), value)),
        },
        Err(_) => Ok(QueueBackend::Redis),
    }
}
