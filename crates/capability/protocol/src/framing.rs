//! 拆帧与 IMEI 握手解析
//!
//! TCP 是字节流，一帧可能跨多次读取，一次读取也可能包含多帧。
//! `FrameBuffer` 累积字节，仅在帧完整时切出，不会解码半帧。

use crate::codec8::{FRAME_HEADER_LEN, FRAME_TRAILER_LEN};
use crate::error::ProtocolError;
use bytes::{Buf, Bytes, BytesMut};

/// IMEI 最大长度
pub const MAX_IMEI_LEN: usize = 32;

/// 解析握手报文：`u16 长度 + ASCII IMEI`。
///
/// 字节不足时返回 `Ok(None)`；完整时返回 IMEI 与消耗的字节数。
pub fn parse_imei(buf: &[u8]) -> Result<Option<(String, usize)>, ProtocolError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    if len == 0 || len > MAX_IMEI_LEN {
        return Err(ProtocolError::InvalidImei(format!("length {len}")));
    }
    let Some(raw) = buf.get(2..2 + len) else {
        return Ok(None);
    };
    if !raw.iter().all(|byte| byte.is_ascii_graphic()) {
        return Err(ProtocolError::InvalidImei("non-ascii bytes".to_string()));
    }
    let imei = String::from_utf8_lossy(raw).into_owned();
    Ok(Some((imei, 2 + len)))
}

/// 会话累积缓冲。
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
    max_frame_bytes: usize,
}

impl FrameBuffer {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            max_frame_bytes,
        }
    }

    /// 追加一次读取的字节
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// 丢弃全部累积字节（解码失败后的恢复策略）
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// 切出下一帧完整字节。
    ///
    /// - 不足一帧：`Ok(None)`，等待更多数据
    /// - 声明长度超过上限：`MalformedFrame`，缓冲保持原样由调用方清空
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        if self.buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }
        let data_len = (&self.buf[4..FRAME_HEADER_LEN]).get_u32() as usize;
        let total = FRAME_HEADER_LEN
            .saturating_add(data_len)
            .saturating_add(FRAME_TRAILER_LEN);
        if total > self.max_frame_bytes {
            return Err(ProtocolError::MalformedFrame(format!(
                "declared frame of {total} bytes exceeds limit of {}",
                self.max_frame_bytes
            )));
        }
        if self.buf.len() < total {
            return Ok(None);
        }
        Ok(Some(self.buf.split_to(total).freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec8::decode;
    use crate::codec8::tests::{frame_bytes, record_bytes};

    fn sample_frame() -> Vec<u8> {
        let first = record_bytes(1_767_300_000_000, 41.2995, 69.2401, 60, &[(239, 1)], &[]);
        let second = record_bytes(1_767_300_010_000, 41.3001, 69.2410, 55, &[(239, 1)], &[]);
        frame_bytes(&[first, second])
    }

    #[test]
    fn imei_waits_for_complete_handshake() {
        let mut bytes = vec![0, 15];
        bytes.extend_from_slice(b"352093089612345");
        assert!(parse_imei(&bytes[..1]).expect("partial").is_none());
        assert!(parse_imei(&bytes[..10]).expect("partial").is_none());
        let (imei, consumed) = parse_imei(&bytes).expect("complete").expect("imei");
        assert_eq!(imei, "352093089612345");
        assert_eq!(consumed, 17);
    }

    #[test]
    fn imei_length_is_bounded() {
        assert!(matches!(
            parse_imei(&[0, 0]),
            Err(ProtocolError::InvalidImei(_))
        ));
        assert!(matches!(
            parse_imei(&[0, 33]),
            Err(ProtocolError::InvalidImei(_))
        ));
    }

    #[test]
    fn frame_split_at_every_offset_reassembles() {
        let frame = sample_frame();
        let whole = decode(&frame).expect("whole");
        for cut in 1..frame.len() {
            let mut buffer = FrameBuffer::new(65_536);
            buffer.extend(&frame[..cut]);
            assert!(buffer.next_frame().expect("partial").is_none());
            buffer.extend(&frame[cut..]);
            let bytes = buffer.next_frame().expect("complete").expect("frame");
            assert_eq!(decode(&bytes).expect("decode"), whole);
            assert!(buffer.is_empty());
        }
    }

    #[test]
    fn back_to_back_frames_are_sliced_in_order() {
        let frame = sample_frame();
        let mut buffer = FrameBuffer::new(65_536);
        let mut joined = frame.clone();
        joined.extend_from_slice(&frame);
        joined.extend_from_slice(&frame[..5]);
        buffer.extend(&joined);
        assert!(buffer.next_frame().expect("first").is_some());
        assert!(buffer.next_frame().expect("second").is_some());
        assert!(buffer.next_frame().expect("partial").is_none());
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn oversized_declaration_is_malformed() {
        let mut buffer = FrameBuffer::new(1_024);
        buffer.extend(&[0, 0, 0, 0, 0, 1, 0, 0]);
        assert!(matches!(
            buffer.next_frame(),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }
}
