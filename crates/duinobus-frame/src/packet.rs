use std::fmt;

use bytes::Bytes;
use tracing::debug;

use crate::command::command_name;
use crate::crc::crc8;
use crate::pack::Unpacker;

/// Start/end of frame.
pub const END: u8 = 0xC0;
/// Next byte is escaped.
pub const ESC: u8 = 0xDB;
/// Escaped form of [`END`].
pub const ESC_END: u8 = 0xDC;
/// Escaped form of [`ESC`].
pub const ESC_ESC: u8 = 0xDD;

/// Maximum payload carried by one packet.
pub const MAX_PAYLOAD: usize = 256;

/// One message on the bus: a command identifier plus a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Command identifier.
    pub command: u8,
    /// Payload bytes (at most [`MAX_PAYLOAD`] on the wire).
    pub payload: Bytes,
}

impl Packet {
    /// Create a new packet.
    pub fn new(command: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// Create a packet with no payload.
    pub fn empty(command: u8) -> Self {
        Self::new(command, Bytes::new())
    }

    /// CRC-8 over the command byte followed by the payload.
    pub fn checksum(&self) -> u8 {
        crc8(crc8(0, &[self.command]), &self.payload)
    }

    /// Number of bytes this packet occupies on the wire, delimiters and
    /// escapes included.
    pub fn wire_size(&self) -> usize {
        let body: usize = std::iter::once(self.command)
            .chain(self.payload.iter().copied())
            .chain(std::iter::once(self.checksum()))
            .map(escaped_len)
            .sum();
        body + 2
    }

    /// Sequential reader over the payload fields.
    pub fn unpacker(&self) -> Unpacker<'_> {
        Unpacker::new(&self.payload)
    }

    /// Log the packet contents at debug level.
    pub fn dump(&self, label: &str) {
        debug!(
            label,
            command = format_args!("0x{:02x}", self.command),
            name = command_name(self.command),
            len = self.payload.len(),
            crc = format_args!("0x{:02x}", self.checksum()),
            data = %Hex(&self.payload),
            "packet"
        );
    }
}

fn escaped_len(byte: u8) -> usize {
    if byte == END || byte == ESC {
        2
    } else {
        1
    }
}

/// Formats bytes as space-separated lowercase hex.
pub struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, byte) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
