//! 帧格式: 1字节操作码 + 4字节大端长度 + 负载
//! Wire framing shared by the TCP transport and its tests
//!
//! 长度前缀的切分交给 tokio_util 的 LengthDelimitedCodec, 这里只负责操作码

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::error::TransportError;

pub const HEADER_LEN: usize = 5;
const OPCODE_LEN: usize = 1;
const LENGTH_FIELD_LEN: usize = HEADER_LEN - OPCODE_LEN;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Text,
    Binary,
    Ping,
    Pong,
}

impl Opcode {
    pub fn as_byte(self) -> u8 {
        match self {
            Opcode::Text => 0x01,
            Opcode::Binary => 0x02,
            Opcode::Ping => 0x09,
            Opcode::Pong => 0x0A,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Opcode::Text),
            0x02 => Some(Opcode::Binary),
            0x09 => Some(Opcode::Ping),
            0x0A => Some(Opcode::Pong),
            _ => None,
        }
    }
}

/// 操作码 + 长度前缀编解码器, 可以在任意字节边界上增量解码
#[derive(Debug)]
pub struct WireCodec {
    frames: LengthDelimitedCodec,
}

impl WireCodec {
    pub fn new(max_len: usize) -> Self {
        // 长度字段位于操作码之后, 解码结果保留整个头部 (由 decode 拆出操作码)
        let frames = LengthDelimitedCodec::builder()
            .length_field_offset(OPCODE_LEN)
            .length_field_length(LENGTH_FIELD_LEN)
            .length_adjustment(HEADER_LEN as isize)
            .num_skip(0)
            .max_frame_length(max_len)
            .big_endian()
            .new_codec();
        Self { frames }
    }
}

impl Decoder for WireCodec {
    type Item = (Opcode, Bytes);
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(mut frame) = self.frames.decode(src).map_err(|e| TransportError::Protocol(e.to_string()))? else {
            return Ok(None);
        };
        let byte = frame[0];
        let opcode =
            Opcode::from_byte(byte).ok_or_else(|| TransportError::Protocol(format!("unknown opcode 0x{byte:02X}")))?;
        frame.advance(HEADER_LEN);
        Ok(Some((opcode, frame.freeze())))
    }
}

impl<'a> Encoder<(Opcode, &'a [u8])> for WireCodec {
    type Error = TransportError;

    fn encode(&mut self, (opcode, payload): (Opcode, &'a [u8]), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = u32::try_from(payload.len()).map_err(|_| TransportError::PayloadTooLarge(payload.len()))?;
        dst.reserve(HEADER_LEN + payload.len());
        dst.put_u8(opcode.as_byte());
        dst.put_u32(len);
        dst.extend_from_slice(payload);
        Ok(())
    }
}
