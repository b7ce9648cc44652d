use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::decoder::PacketDecoder;
use crate::encoder::encode_packet;
use crate::error::FrameError;
use crate::packet::Packet;

/// `tokio_util` codec over the packet wire format.
///
/// Corrupted frames are logged and skipped rather than ending the stream,
/// matching the blocking reader.
#[derive(Debug, Default)]
pub struct PacketCodec {
    decoder: PacketDecoder,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.decoder.set_debug(debug);
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, FrameError> {
        while src.has_remaining() {
            match self.decoder.decode_byte(src.get_u8()) {
                Ok(Some(packet)) => return Ok(Some(packet)),
                Ok(None) => {}
                Err(err) if err.is_framing() => warn!(error = %err, "dropping corrupted frame"),
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = FrameError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_packet(&packet, dst)
    }
}

impl Encoder<&Packet> for PacketCodec {
    type Error = FrameError;

    fn encode(&mut self, packet: &Packet, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_packet(packet, dst)
    }
}
