use duinobus_frame::{write_packet, Packet};
use duinobus_transport::ByteTransport;

use crate::error::{BusError, Result};

/// Writes packets to a transport one byte at a time.
pub struct PacketWriter<T> {
    transport: T,
    debug: bool,
}

impl<T: ByteTransport> PacketWriter<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            debug: false,
        }
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Encode and write one packet.
    ///
    /// The first byte the transport refuses aborts the write; the bytes
    /// already sent are not retracted, and the receiver drops the partial
    /// frame when the next delimiter arrives.
    pub fn send(&mut self, packet: &Packet) -> Result<()> {
        if self.debug {
            packet.dump("sent");
        }
        let transport = &mut self.transport;
        write_packet(packet, |byte| {
            transport.write_byte(byte).map_err(BusError::from)
        })
    }

    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn close(&mut self) -> Result<()> {
        self.transport.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use duinobus_frame::{FrameError, MAX_PAYLOAD};
    use duinobus_transport::{ByteStream, StreamConfig, TransportError};

    use super::*;
    use crate::reader::PacketReader;

    #[test]
    fn sends_escaped_frame() {
        let (device, host) = ByteStream::pair().unwrap();
        let mut writer = PacketWriter::new(host);
        let mut reader = PacketReader::new(device);

        let packet = Packet::new(0xc0, vec![0xdb, 0x00]);
        writer.send(&packet).unwrap();
        let received = reader.read_packet(Duration::from_secs(2)).unwrap().unwrap();
        assert_eq!(received, packet);
    }

    #[test]
    fn oversize_payload_is_rejected_before_writing() {
        let (device, host) = ByteStream::pair().unwrap();
        let mut writer = PacketWriter::new(host);
        let err = writer
            .send(&Packet::new(0x10, vec![0u8; MAX_PAYLOAD + 1]))
            .unwrap_err();
        assert!(matches!(err, BusError::Frame(FrameError::PayloadTooLarge { .. })));
        assert!(!device.is_data_available());
    }

    #[test]
    fn write_failure_aborts_send() {
        let (_device, host) = ByteStream::pair().unwrap();
        let mut writer = PacketWriter::new(host.with_config(StreamConfig {
            write_timeout: Duration::from_millis(10),
        }));
        // Nobody reads, so the socket buffer fills and a write times out.
        let packet = Packet::new(0x10, vec![0x55; MAX_PAYLOAD]);
        let err = loop {
            if let Err(err) = writer.send(&packet) {
                break err;
            }
        };
        assert!(matches!(
            err,
            BusError::Transport(TransportError::WriteTimeout(_))
        ));
    }

    #[test]
    fn closed_writer_rejects_send() {
        let (_device, host) = ByteStream::pair().unwrap();
        let mut writer = PacketWriter::new(host);
        writer.close().unwrap();
        assert!(matches!(
            writer.send(&Packet::empty(0x01)),
            Err(BusError::Transport(TransportError::Shutdown))
        ));
    }
}
