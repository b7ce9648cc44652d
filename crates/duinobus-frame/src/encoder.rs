use bytes::{BufMut, BytesMut};

use crate::crc::crc8;
use crate::error::{FrameError, Result};
use crate::packet::{Packet, END, ESC, ESC_END, ESC_ESC, MAX_PAYLOAD};

/// Lazily yields the wire bytes of one packet.
///
/// The checksum is accumulated as bytes are produced, so nothing is buffered
/// beyond the pending second half of an escape pair.
pub struct PacketEncoder<'a> {
    packet: &'a Packet,
    stage: Stage,
    crc: u8,
    pending: Option<u8>,
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Start,
    Command,
    Payload(usize),
    Checksum,
    End,
    Done,
}

impl<'a> PacketEncoder<'a> {
    pub fn new(packet: &'a Packet) -> Self {
        Self {
            packet,
            stage: Stage::Start,
            crc: 0,
            pending: None,
        }
    }

    fn escape(&mut self, byte: u8) -> u8 {
        match byte {
            END => {
                self.pending = Some(ESC_END);
                ESC
            }
            ESC => {
                self.pending = Some(ESC_ESC);
                ESC
            }
            plain => plain,
        }
    }
}

impl Iterator for PacketEncoder<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if let Some(byte) = self.pending.take() {
            return Some(byte);
        }
        match self.stage {
            Stage::Start => {
                self.stage = Stage::Command;
                Some(END)
            }
            Stage::Command => {
                let command = self.packet.command;
                self.crc = crc8(self.crc, &[command]);
                self.stage = Stage::Payload(0);
                Some(self.escape(command))
            }
            Stage::Payload(idx) => match self.packet.payload.get(idx).copied() {
                Some(byte) => {
                    self.crc = crc8(self.crc, &[byte]);
                    self.stage = Stage::Payload(idx + 1);
                    Some(self.escape(byte))
                }
                None => {
                    self.stage = Stage::Checksum;
                    self.next()
                }
            },
            Stage::Checksum => {
                self.stage = Stage::End;
                let crc = self.crc;
                Some(self.escape(crc))
            }
            Stage::End => {
                self.stage = Stage::Done;
                Some(END)
            }
            Stage::Done => None,
        }
    }
}

impl Packet {
    /// Iterate over this packet's wire bytes.
    ///
    /// The payload length is not checked here; a frame carrying more than
    /// [`MAX_PAYLOAD`] bytes is rejected by the receiving decoder.
    /// [`write_packet`] and [`encode_packet`] check it first.
    pub fn encode(&self) -> PacketEncoder<'_> {
        PacketEncoder::new(self)
    }
}

/// Hand each wire byte of `packet` to `sink`, stopping at the first error.
///
/// An oversize payload fails with `PayloadTooLarge` before the sink sees
/// any byte. The sink decides how to wait for room; the encoder itself
/// does no I/O.
pub fn write_packet<E, F>(packet: &Packet, mut sink: F) -> std::result::Result<(), E>
where
    E: From<FrameError>,
    F: FnMut(u8) -> std::result::Result<(), E>,
{
    check_payload_size(packet)?;
    for byte in packet.encode() {
        sink(byte)?;
    }
    Ok(())
}

/// Append the complete frame for `packet` to `dst`.
pub fn encode_packet(packet: &Packet, dst: &mut BytesMut) -> Result<()> {
    check_payload_size(packet)?;
    dst.reserve(packet.wire_size());
    for byte in packet.encode() {
        dst.put_u8(byte);
    }
    Ok(())
}

fn check_payload_size(packet: &Packet) -> Result<()> {
    if packet.payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: packet.payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    Ok(())
}
