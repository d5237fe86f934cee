//! 设备 TCP 会话服务
//!
//! 每个连接一个任务，状态 `AwaitingImei → Streaming → Closed`：
//! - 握手：读取 `u16 长度 + IMEI`，查询绑定，回写 `0x01`（接受）或 `0x00`（拒绝并关闭）
//! - 数据：累积字节、切出完整帧、解码、投递队列，回写 4 字节大端 ACK（解码出的记录数）
//! - 解码失败：丢弃整个累积缓冲，连接保持
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let listener = TcpListener::bind("0.0.0.0:5027").await?;
//! let server = Arc::new(TcpServer::new(TcpServerConfig::default(), bindings, queue));
//! server.serve(listener).await?;
//! ```

use crate::codec8;
use crate::error::ProtocolError;
use crate::framing::{FrameBuffer, MAX_IMEI_LEN, parse_imei};
use bytes::{Buf, Bytes, BytesMut};
use domain::{TelemetryBatch, VehicleBinding};
use fleet_ingest::BatchQueue;
use fleet_storage::DeviceBindingStore;
use fleet_telemetry::{
    new_session_id, record_batch_enqueued, record_connection_accepted,
    record_connection_rejected, record_frame_decoded, record_frame_malformed,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, error, info, info_span, warn};

const HANDSHAKE_ACCEPTED: u8 = 0x01;
const HANDSHAKE_REJECTED: u8 = 0x00;
const READ_CHUNK: usize = 4096;

/// TCP 服务器配置
#[derive(Debug, Clone)]
pub struct TcpServerConfig {
    /// 最大并发会话数
    pub max_connections: usize,
    /// 空闲超时，超时未收到数据则关闭连接
    pub idle_timeout: Duration,
    /// 单帧声明长度上限（字节）
    pub max_frame_bytes: usize,
}

impl Default for TcpServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            max_frame_bytes: 65_536,
        }
    }
}

/// 设备接入服务器
pub struct TcpServer {
    config: TcpServerConfig,
    bindings: Arc<dyn DeviceBindingStore>,
    queue: Arc<dyn BatchQueue>,
    permits: Arc<Semaphore>,
}

impl TcpServer {
    pub fn new(
        config: TcpServerConfig,
        bindings: Arc<dyn DeviceBindingStore>,
        queue: Arc<dyn BatchQueue>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_connections.max(1)));
        Self {
            config,
            bindings,
            queue,
            permits,
        }
    }

    /// 在已绑定的监听器上接受连接，直到监听器出错。
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), ProtocolError> {
        let local_addr = listener.local_addr()?;
        info!(target: "fleet.session", addr = %local_addr, "tcp_server_listening");
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!(target: "fleet.session", error = %err, "accept_failed");
                    continue;
                }
            };
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                record_connection_rejected();
                warn!(target: "fleet.session", peer = %peer, "connection_limit_reached");
                drop(stream);
                continue;
            };
            if let Err(err) = stream.set_nodelay(true) {
                debug!(target: "fleet.session", peer = %peer, error = %err, "set_nodelay_failed");
            }
            let server = Arc::clone(&self);
            let span = info_span!("session", session_id = %new_session_id(), peer = %peer);
            tokio::spawn(
                async move {
                    let session = Session::new(server.clone(), peer);
                    if let Err(err) = session.run(stream).await {
                        warn!(target: "fleet.session", error = %err, "session_ended_with_error");
                    }
                    drop(permit);
                }
                .instrument(span),
            );
        }
    }
}

/// 单连接会话状态，仅由所属任务访问。
struct Session {
    server: Arc<TcpServer>,
    peer: SocketAddr,
    binding: Option<VehicleBinding>,
    frames: FrameBuffer,
}

impl Session {
    fn new(server: Arc<TcpServer>, peer: SocketAddr) -> Self {
        let frames = FrameBuffer::new(server.config.max_frame_bytes);
        Self {
            server,
            peer,
            binding: None,
            frames,
        }
    }

    async fn run<S>(mut self, mut stream: S) -> Result<(), ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let Some(binding) = self.handshake(&mut stream).await? else {
            return Ok(());
        };
        self.binding = Some(binding);

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            self.drain_frames(&mut stream).await?;
            let read = self.read_chunk(&mut stream, &mut chunk).await?;
            if read == 0 {
                info!(
                    target: "fleet.session",
                    vehicle_id = binding.vehicle_id,
                    buffered = self.frames.len(),
                    "session_closed"
                );
                return Ok(());
            }
            self.frames.extend(&chunk[..read]);
        }
    }

    async fn read_chunk<S>(&self, stream: &mut S, chunk: &mut [u8]) -> Result<usize, ProtocolError>
    where
        S: AsyncRead + Unpin,
    {
        match tokio::time::timeout(self.server.config.idle_timeout, stream.read(chunk)).await {
            Ok(read) => Ok(read?),
            Err(_) => Err(ProtocolError::Timeout(format!(
                "no data from {} for {:?}",
                self.peer, self.server.config.idle_timeout
            ))),
        }
    }

    /// 握手阶段；IMEI 可跨多次读取到达，同一读取中 IMEI 之后的字节进入帧缓冲。
    async fn handshake<S>(&mut self, stream: &mut S) -> Result<Option<VehicleBinding>, ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut pending = BytesMut::with_capacity(2 + MAX_IMEI_LEN);
        let mut chunk = [0u8; READ_CHUNK];
        let imei = loop {
            let parsed = match parse_imei(&pending) {
                Ok(parsed) => parsed,
                Err(err) => {
                    record_connection_rejected();
                    warn!(target: "fleet.session", error = %err, "imei_rejected");
                    reply(stream, &[HANDSHAKE_REJECTED]).await?;
                    return Ok(None);
                }
            };
            if let Some((imei, consumed)) = parsed {
                pending.advance(consumed);
                break imei;
            }
            let read = self.read_chunk(stream, &mut chunk).await?;
            if read == 0 {
                return Ok(None);
            }
            pending.extend_from_slice(&chunk[..read]);
        };

        let binding = match self.server.bindings.resolve_imei(&imei).await {
            Ok(binding) => binding,
            Err(err) => {
                record_connection_rejected();
                error!(target: "fleet.session", imei = %imei, error = %err, "imei_lookup_failed");
                reply(stream, &[HANDSHAKE_REJECTED]).await?;
                return Err(ProtocolError::Storage(err.to_string()));
            }
        };
        let Some(binding) = binding else {
            record_connection_rejected();
            reply(stream, &[HANDSHAKE_REJECTED]).await?;
            return Err(ProtocolError::UnknownDevice(imei));
        };

        record_connection_accepted();
        info!(
            target: "fleet.session",
            imei = %imei,
            vehicle_id = binding.vehicle_id,
            device_id = binding.device_id,
            "imei_accepted"
        );
        reply(stream, &[HANDSHAKE_ACCEPTED]).await?;
        self.frames.extend(&pending);
        Ok(Some(binding))
    }

    async fn drain_frames<S>(&mut self, stream: &mut S) -> Result<(), ProtocolError>
    where
        S: AsyncWrite + Unpin,
    {
        let Some(binding) = self.binding else {
            return Ok(());
        };
        loop {
            let frame = match self.frames.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(err) => {
                    self.discard(&err);
                    return Ok(());
                }
            };
            let accepted = match self.handle_frame(frame, binding).await {
                Ok(accepted) => accepted,
                Err(err) => {
                    self.discard(&err);
                    return Ok(());
                }
            };
            reply(stream, &accepted.to_be_bytes()).await?;
        }
    }

    fn discard(&mut self, err: &ProtocolError) {
        record_frame_malformed();
        warn!(
            target: "fleet.session",
            error = %err,
            discarded = self.frames.len(),
            "frame_malformed"
        );
        self.frames.clear();
    }

    /// 解码并投递一帧，返回 ACK 计数。投递失败时 ACK 为 0，设备保留记录稍后重发。
    async fn handle_frame(
        &self,
        frame: Bytes,
        binding: VehicleBinding,
    ) -> Result<u32, ProtocolError> {
        let decoded = codec8::decode(&frame)?;
        let count = decoded.records.len();
        record_frame_decoded(count);
        info!(
            target: "fleet.session",
            vehicle_id = binding.vehicle_id,
            codec_id = decoded.codec_id,
            records = count,
            bytes = frame.len(),
            "frame_decoded"
        );
        if count == 0 {
            return Ok(0);
        }
        let batch = TelemetryBatch {
            vehicle_id: binding.vehicle_id,
            device_id: binding.device_id,
            bytes_received: frame.len() as u64,
            records: decoded.records,
        };
        match self.server.queue.enqueue(batch).await {
            Ok(()) => {
                record_batch_enqueued();
                Ok(count as u32)
            }
            Err(err) => {
                error!(
                    target: "fleet.session",
                    vehicle_id = binding.vehicle_id,
                    records = count,
                    error = %err,
                    "enqueue_failed"
                );
                Ok(0)
            }
        }
    }
}

async fn reply<S>(stream: &mut S, bytes: &[u8]) -> Result<(), ProtocolError>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(bytes).await?;
    stream.flush().await?;
    Ok(())
}
