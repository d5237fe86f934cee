//! Codec 8 帧解码
//!
//! 帧结构（大端序）：
//!
//! ```text
//! | preamble 4 | data length 4 | codec id 1 | count 1 | records ... | count 1 | crc 4 |
//! ```
//!
//! 单条记录：
//!
//! ```text
//! | ts 8 | priority 1 | lng 4 | lat 4 | altitude 2 | angle 2 | satellites 1 | speed 2 | io |
//! ```
//!
//! IO 段：`event id 1 | total 1`，随后依次为 1/2/4/8 字节值的分组，
//! 每组以 1 字节数量开头，元素为 `(id 1, value N)`。
//!
//! 尾部记录数与 CRC 不做校验。

use crate::error::ProtocolError;
use domain::{IoSnapshot, Record};
use std::collections::BTreeMap;

/// Codec 8 标识
pub const CODEC_8: u8 = 0x08;

/// 前导 + 数据长度
pub const FRAME_HEADER_LEN: usize = 8;

/// 尾部记录数 + CRC 占位
pub const FRAME_TRAILER_LEN: usize = 4;

/// 解码后的帧
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub codec_id: u8,
    pub records: Vec<Record>,
}

/// 带边界检查的大端读取器，越界时返回 `MalformedFrame`。
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let end = self.pos.checked_add(N).filter(|end| *end <= self.buf.len());
        let Some(end) = end else {
            return Err(ProtocolError::MalformedFrame(format!(
                "read of {N} bytes at offset {} exceeds frame of {} bytes",
                self.pos,
                self.buf.len()
            )));
        };
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(out)
    }

    fn skip(&mut self, len: usize) -> Result<(), ProtocolError> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.buf.len());
        let Some(end) = end else {
            return Err(ProtocolError::MalformedFrame(format!(
                "skip of {len} bytes at offset {} exceeds frame of {} bytes",
                self.pos,
                self.buf.len()
            )));
        };
        self.pos = end;
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    fn i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(i16::from_be_bytes(self.take()?))
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    fn i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_be_bytes(self.take()?))
    }

    fn i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(i64::from_be_bytes(self.take()?))
    }
}

/// 解码一帧完整字节。
///
/// 调用方保证传入恰好一帧；函数无副作用，相同输入总是得到相同输出。
pub fn decode(bytes: &[u8]) -> Result<Frame, ProtocolError> {
    let mut reader = Reader::new(bytes);
    reader.skip(4)?;
    reader.skip(4)?;
    let codec_id = reader.u8()?;
    if codec_id != CODEC_8 {
        return Err(ProtocolError::MalformedFrame(format!(
            "unsupported codec 0x{codec_id:02x}"
        )));
    }
    let count = reader.u8()?;
    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        records.push(decode_record(&mut reader)?);
    }
    Ok(Frame { codec_id, records })
}

fn decode_record(reader: &mut Reader<'_>) -> Result<Record, ProtocolError> {
    let ts_ms = reader.i64()?;
    let priority = reader.u8()?;
    let lng = f64::from(reader.i32()?) / 1e7;
    let lat = f64::from(reader.i32()?) / 1e7;
    let altitude = reader.i16()?;
    let angle = reader.u16()?;
    let satellites = reader.u8()?;
    let speed = reader.u16()?;
    let io = decode_io(reader)?;
    Ok(Record {
        ts_ms,
        priority,
        lat,
        lng,
        altitude,
        angle,
        satellites,
        speed,
        io,
    })
}

fn decode_io(reader: &mut Reader<'_>) -> Result<IoSnapshot, ProtocolError> {
    // event id / total io count
    reader.skip(1)?;
    reader.skip(1)?;
    let mut elements = BTreeMap::new();
    for width in [1usize, 2, 4, 8] {
        let count = reader.u8()?;
        for _ in 0..count {
            let id = reader.u8()?;
            let value = match width {
                1 => i64::from(reader.u8()?),
                2 => i64::from(reader.u16()?),
                4 => i64::from(reader.u32()?),
                _ => reader.i64()?,
            };
            elements.insert(id, value);
        }
    }
    Ok(IoSnapshot::from_elements(elements))
}
