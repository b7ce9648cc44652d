use std::time::{Duration, Instant};

use duinobus_frame::{Packet, PacketDecoder};
use duinobus_transport::{ByteTransport, TransportError};
use tracing::warn;

use crate::error::Result;

/// Feeds bytes from a transport into a frame decoder.
///
/// Framing errors never escape [`read_available`](Self::read_available) or
/// [`read_packet`](Self::read_packet): they are logged and the decoder
/// resynchronizes on the next delimiter.
pub struct PacketReader<T> {
    transport: T,
    decoder: PacketDecoder,
}

impl<T: ByteTransport> PacketReader<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            decoder: PacketDecoder::new(),
        }
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.decoder.set_debug(debug);
    }

    /// Read at most one pending byte and feed it to the decoder.
    ///
    /// `Ok(None)` covers both "no byte pending" and "frame incomplete".
    pub fn process_byte(&mut self) -> Result<Option<Packet>> {
        match self.transport.read_byte()? {
            Some(byte) => Ok(self.decoder.decode_byte(byte)?),
            None => Ok(None),
        }
    }

    /// Drain every pending byte, handing each completed packet to `on_packet`.
    pub fn read_available(
        &mut self,
        mut on_packet: impl FnMut(Packet),
    ) -> std::result::Result<(), TransportError> {
        while let Some(byte) = self.transport.read_byte()? {
            match self.decoder.decode_byte(byte) {
                Ok(Some(packet)) => on_packet(packet),
                Ok(None) => {}
                Err(err) => warn!(error = %err, "framing error, resynchronizing"),
            }
        }
        Ok(())
    }

    /// Block up to `timeout` for the next complete packet.
    pub fn read_packet(&mut self, timeout: Duration) -> std::result::Result<Option<Packet>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            while let Some(byte) = self.transport.read_byte()? {
                match self.decoder.decode_byte(byte) {
                    Ok(Some(packet)) => return Ok(Some(packet)),
                    Ok(None) => {}
                    Err(err) => warn!(error = %err, "framing error, resynchronizing"),
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            self.transport.poll_readable(deadline - now)?;
        }
    }

    /// Borrow the underlying transport.
    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}
