//! Field-level packing for packet payloads.
//!
//! Integers are little-endian. A string is a length byte (counting the
//! terminating NUL) followed by the bytes and the NUL.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result, UnpackError};
use crate::packet::{Packet, MAX_PAYLOAD};

/// Reads fields sequentially from a payload.
#[derive(Debug, Clone)]
pub struct Unpacker<'a> {
    data: &'a [u8],
}

impl<'a> Unpacker<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    pub fn unpack_bytes(&mut self, len: usize) -> std::result::Result<&'a [u8], UnpackError> {
        if self.data.len() < len {
            return Err(UnpackError::Underflow {
                needed: len,
                remaining: self.data.len(),
            });
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    pub fn unpack_u8(&mut self) -> std::result::Result<u8, UnpackError> {
        Ok(self.unpack_bytes(1)?[0])
    }

    pub fn unpack_u16(&mut self) -> std::result::Result<u16, UnpackError> {
        let bytes = self.unpack_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn unpack_u32(&mut self) -> std::result::Result<u32, UnpackError> {
        let bytes = self.unpack_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a length-prefixed string. Text after the first NUL is ignored.
    pub fn unpack_str(&mut self) -> std::result::Result<&'a str, UnpackError> {
        let len = self.unpack_u8()? as usize;
        let bytes = self.unpack_bytes(len)?;
        let text = match bytes.iter().position(|&b| b == 0) {
            Some(nul) => &bytes[..nul],
            None => bytes,
        };
        Ok(std::str::from_utf8(text)?)
    }
}

/// Builds a payload field by field, bounded by [`MAX_PAYLOAD`].
#[derive(Debug, Default)]
pub struct Packer {
    buf: BytesMut,
}

impl Packer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_PAYLOAD),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Room left before the payload is full.
    pub fn space_remaining(&self) -> usize {
        MAX_PAYLOAD - self.buf.len()
    }

    fn reserve(&self, extra: usize) -> Result<()> {
        if extra > self.space_remaining() {
            return Err(FrameError::PayloadTooLarge {
                size: self.buf.len() + extra,
                max: MAX_PAYLOAD,
            });
        }
        Ok(())
    }

    pub fn pack_u8(&mut self, value: u8) -> Result<&mut Self> {
        self.reserve(1)?;
        self.buf.put_u8(value);
        Ok(self)
    }

    pub fn pack_u16(&mut self, value: u16) -> Result<&mut Self> {
        self.reserve(2)?;
        self.buf.put_u16_le(value);
        Ok(self)
    }

    pub fn pack_u32(&mut self, value: u32) -> Result<&mut Self> {
        self.reserve(4)?;
        self.buf.put_u32_le(value);
        Ok(self)
    }

    pub fn pack_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        self.reserve(bytes.len())?;
        self.buf.put_slice(bytes);
        Ok(self)
    }

    /// Append a string with its length byte and terminating NUL.
    pub fn pack_str(&mut self, text: &str) -> Result<&mut Self> {
        let field_len = text.len() + 1;
        if field_len > u8::MAX as usize {
            return Err(FrameError::PayloadTooLarge {
                size: field_len,
                max: u8::MAX as usize,
            });
        }
        self.reserve(1 + field_len)?;
        self.buf.put_u8(field_len as u8);
        self.buf.put_slice(text.as_bytes());
        self.buf.put_u8(0);
        Ok(self)
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    /// Finish the payload as a packet for `command`.
    pub fn into_packet(self, command: u8) -> Packet {
        Packet::new(command, self.into_bytes())
    }
}
