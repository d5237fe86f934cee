//! GPS 设备接入服务：TCP 接入、队列消费、运动状态巡检与探针 HTTP。

use fleet_config::{AppConfig, QueueBackend};
use fleet_ingest::{BatchHandler, BatchQueue, InMemoryBatchQueue, RedisBatchQueue};
use fleet_live::{LiveStatusSink, RedisLiveSink};
use fleet_motion::MotionTracker;
use fleet_pipeline::Ingestor;
use fleet_protocol::TcpServer;
use fleet_storage::{
    PgDeviceBindingStore, PgDriverAssignmentStore, PgPositionStore, PgStopEventStore,
    RedisMotionStateStore, connect_pool,
};
use fleet_telemetry::init_tracing;
use fleet_tracker::settings::{
    ingest_config, motion_config, queue_config, sweep_interval, tcp_config,
};
use fleet_tracker::{PipelineHandler, create_router};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    // Postgres 存储（需先执行 migrations）
    let pool = connect_pool(&config.database_url).await?;
    let bindings = Arc::new(PgDeviceBindingStore::new(pool.clone()));
    let positions = Arc::new(PgPositionStore::new(pool.clone()));
    let drivers = Arc::new(PgDriverAssignmentStore::new(pool.clone()));
    let stops = Arc::new(PgStopEventStore::new(pool));

    // Redis：运动状态缓存与实时推送
    let states = Arc::new(RedisMotionStateStore::connect(
        &config.redis_url,
        config.motion_key_prefix.clone(),
    )?);
    let live: Arc<dyn LiveStatusSink> = Arc::new(RedisLiveSink::connect(
        &config.redis_url,
        config.live_channel_prefix.clone(),
    )?);

    let ingestor = Ingestor::new(positions, drivers, live.clone(), ingest_config(&config));
    let motion = Arc::new(MotionTracker::new(
        states,
        stops,
        live,
        motion_config(&config),
    ));
    let handler: Arc<dyn BatchHandler> =
        Arc::new(PipelineHandler::new(ingestor, motion.clone()));

    // 工作队列：Redis 持久队列或进程内分区队列
    let queue: Arc<dyn BatchQueue> = match config.queue_backend {
        QueueBackend::Redis => {
            let queue = RedisBatchQueue::connect(&config.redis_url, queue_config(&config))?;
            let recovered = queue.recover_in_flight().await?;
            info!(recovered = recovered, "queue backend: redis");
            let _consumers = queue.spawn_consumers(handler);
            Arc::new(queue)
        }
        QueueBackend::Memory => {
            info!("queue backend: memory (batches are lost on restart)");
            let (queue, _consumers) = InMemoryBatchQueue::start(queue_config(&config), handler);
            Arc::new(queue)
        }
    };

    // 候选状态超时巡检
    let _sweeper = motion.spawn_sweeper(sweep_interval(&config));

    // 设备 TCP 接入
    let tcp_listener = tokio::net::TcpListener::bind(&config.tcp_addr).await?;
    let server = Arc::new(TcpServer::new(tcp_config(&config), bindings, queue));
    tokio::spawn(async move {
        if let Err(err) = server.serve(tcp_listener).await {
            error!(error = %err, "tcp server stopped");
        }
    });

    // 探针 HTTP：健康检查与指标
    let http_listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(addr = %config.http_addr, "probe http listening");
    axum::serve(http_listener, create_router()).await?;
    Ok(())
}
