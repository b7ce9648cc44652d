use bytes::{BufMut, BytesMut};

use crate::crc::crc8;
use crate::error::{FrameError, Result};
use crate::packet::{Packet, END, ESC, ESC_END, ESC_ESC, MAX_PAYLOAD};

/// Largest unescaped frame body: command + payload + checksum.
pub const BUFFER_CAPACITY: usize = 1 + MAX_PAYLOAD + 1;

/// Where the decoder is within the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Waiting for a frame delimiter.
    Idle,
    /// Collecting frame bytes.
    InPacket,
    /// The previous byte was an escape.
    InEscape,
}

/// Byte-at-a-time frame decoder.
///
/// Feed it every byte read from the transport. Framing errors are reported
/// once and the decoder resynchronizes on the next delimiter, so the caller
/// can log the error and keep feeding.
///
/// ```
/// use duinobus_frame::PacketDecoder;
///
/// let mut decoder = PacketDecoder::new();
/// let mut out = None;
/// for byte in [0xc0, 0x01, 0x02, 0x03, 0x48, 0xc0] {
///     if let Some(packet) = decoder.decode_byte(byte).unwrap() {
///         out = Some(packet);
///     }
/// }
/// let packet = out.unwrap();
/// assert_eq!(packet.command, 0x01);
/// assert_eq!(&packet.payload[..], &[0x02, 0x03]);
/// ```
#[derive(Debug)]
pub struct PacketDecoder {
    state: DecoderState,
    buf: BytesMut,
    debug: bool,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Idle,
            buf: BytesMut::with_capacity(BUFFER_CAPACITY),
            debug: false,
        }
    }

    /// Dump every decoded packet at debug level.
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Drop any partial frame and wait for the next delimiter.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = DecoderState::Idle;
    }

    /// Consume one byte.
    ///
    /// Returns `Ok(None)` while the frame is incomplete and `Ok(Some(_))`
    /// when a delimiter closes a valid frame.
    pub fn decode_byte(&mut self, byte: u8) -> Result<Option<Packet>> {
        match self.state {
            DecoderState::Idle => {
                if byte == END {
                    self.buf.clear();
                    self.state = DecoderState::InPacket;
                }
                Ok(None)
            }
            DecoderState::InPacket => {
                if byte == END {
                    return self.complete();
                }
                if self.buf.len() >= BUFFER_CAPACITY {
                    self.reset();
                    return Err(FrameError::TooMuchData { max: MAX_PAYLOAD });
                }
                if byte == ESC {
                    self.state = DecoderState::InEscape;
                } else {
                    self.buf.put_u8(byte);
                }
                Ok(None)
            }
            DecoderState::InEscape => {
                let literal = match byte {
                    ESC_END => END,
                    ESC_ESC => ESC,
                    other => other,
                };
                self.buf.put_u8(literal);
                self.state = DecoderState::InPacket;
                Ok(None)
            }
        }
    }

    /// Feed a slice, collecting complete packets.
    ///
    /// Stops at the first framing error; bytes after it are not consumed.
    pub fn decode_slice(&mut self, bytes: &[u8]) -> Result<Vec<Packet>> {
        let mut packets = Vec::new();
        for &byte in bytes {
            if let Some(packet) = self.decode_byte(byte)? {
                packets.push(packet);
            }
        }
        Ok(packets)
    }

    fn complete(&mut self) -> Result<Option<Packet>> {
        match self.buf.len() {
            // Back-to-back delimiters: keep waiting for a body.
            0 => Ok(None),
            1 => {
                self.reset();
                Err(FrameError::TooSmall)
            }
            len => {
                let received = self.buf[len - 1];
                let expected = crc8(0, &self.buf[..len - 1]);
                if received != expected {
                    self.reset();
                    return Err(FrameError::ChecksumMismatch { received, expected });
                }

                let mut body = self.buf.split_to(len - 1);
                self.buf.clear();
                self.state = DecoderState::Idle;

                let command = body[0];
                let payload = body.split_off(1).freeze();
                let packet = Packet { command, payload };
                if self.debug {
                    packet.dump("rcvd");
                }
                Ok(Some(packet))
            }
        }
    }
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Result<Option<Packet>>> {
        let mut decoder = PacketDecoder::new();
        bytes.iter().map(|&b| decoder.decode_byte(b)).collect()
    }

    fn single_packet(bytes: &[u8]) -> Packet {
        let mut decoder = PacketDecoder::new();
        let mut packets = decoder.decode_slice(bytes).unwrap();
        assert_eq!(packets.len(), 1, "expected exactly one packet");
        assert_eq!(decoder.state(), DecoderState::Idle);
        packets.remove(0)
    }

    #[test]
    fn command_only() {
        let packet = single_packet(&[0xc0, 0x01, 0x07, 0xc0]);
        assert_eq!(packet.command, 0x01);
        assert!(packet.payload.is_empty());
    }

    #[test]
    fn command_with_payload() {
        let packet = single_packet(&[0xc0, 0x01, 0x02, 0x03, 0x48, 0xc0]);
        assert_eq!(packet.command, 0x01);
        assert_eq!(&packet.payload[..], &[0x02, 0x03]);
    }

    #[test]
    fn escaped_command_bytes() {
        let packet = single_packet(&[0xc0, 0xdb, 0xdc, 0x02, 0x03, 0xae, 0xc0]);
        assert_eq!(packet.command, 0xc0);
        assert_eq!(&packet.payload[..], &[0x02, 0x03]);

        let packet = single_packet(&[0xc0, 0xdb, 0xdd, 0x02, 0x03, 0xe0, 0xc0]);
        assert_eq!(packet.command, 0xdb);
        assert_eq!(&packet.payload[..], &[0x02, 0x03]);
    }

    #[test]
    fn escaped_payload_byte() {
        let packet = single_packet(&[0xc0, 0x01, 0xdb, 0xdc, 0x03, 0x8f, 0xc0]);
        assert_eq!(packet.command, 0x01);
        assert_eq!(&packet.payload[..], &[0xc0, 0x03]);
    }

    #[test]
    fn longer_payload() {
        let mut frame = vec![0xc0];
        frame.extend(0x00..=0x0e);
        frame.extend([0x14, 0xc0]);
        let packet = single_packet(&frame);
        assert_eq!(packet.command, 0x00);
        assert_eq!(packet.payload.to_vec(), (0x01..=0x0e).collect::<Vec<u8>>());
    }

    #[test]
    fn leading_garbage_is_ignored() {
        let packet = single_packet(&[0x55, 0xaa, 0x01, 0xc0, 0x01, 0x07, 0xc0]);
        assert_eq!(packet.command, 0x01);
    }

    #[test]
    fn too_small() {
        let results = decode_all(&[0xc0, 0x01, 0xc0]);
        assert!(matches!(results[2], Err(FrameError::TooSmall)));
    }

    #[test]
    fn too_small_resets_to_idle() {
        let mut decoder = PacketDecoder::new();
        decoder.decode_slice(&[0xc0, 0x01]).unwrap();
        assert!(decoder.decode_byte(0xc0).is_err());
        assert_eq!(decoder.state(), DecoderState::Idle);
    }

    #[test]
    fn empty_frames_are_noise() {
        let mut decoder = PacketDecoder::new();
        for byte in [0xc0, 0xc0, 0xc0] {
            assert!(decoder.decode_byte(byte).unwrap().is_none());
        }
        assert_eq!(decoder.state(), DecoderState::InPacket);

        let packets = decoder.decode_slice(&[0x01, 0x02, 0x03, 0x48, 0xc0]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(&packets[0].payload[..], &[0x02, 0x03]);
    }

    #[test]
    fn checksum_mismatch_reports_both_values() {
        let results = decode_all(&[0xc0, 0x01, 0x02, 0x03, 0x49, 0xc0]);
        match &results[5] {
            Err(FrameError::ChecksumMismatch { received, expected }) => {
                assert_eq!(*received, 0x49);
                assert_eq!(*expected, 0x48);
            }
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
    }

    #[test]
    fn recovers_after_checksum_mismatch() {
        let mut decoder = PacketDecoder::new();
        assert!(decoder
            .decode_slice(&[0xc0, 0x01, 0x02, 0x03, 0x49, 0xc0])
            .is_err());
        assert_eq!(decoder.state(), DecoderState::Idle);

        let packets = decoder.decode_slice(&[0xc0, 0x01, 0x07, 0xc0]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].command, 0x01);
    }

    #[test]
    fn single_bit_flips_are_detected() {
        let frame = [0xc0u8, 0x01, 0x02, 0x03, 0x48, 0xc0];
        for idx in 1..frame.len() - 1 {
            for bit in 0..8 {
                let mut corrupted = frame;
                corrupted[idx] ^= 1 << bit;
                // Flips that create a delimiter or escape change the framing itself.
                if corrupted[idx] == END || corrupted[idx] == ESC {
                    continue;
                }
                let mut decoder = PacketDecoder::new();
                let result = decoder.decode_slice(&corrupted);
                assert!(
                    matches!(result, Err(FrameError::ChecksumMismatch { .. })),
                    "flip byte {idx} bit {bit}: {result:?}"
                );
            }
        }
    }

    #[test]
    fn unknown_escape_is_taken_literally() {
        // 0xdb 0x01 decodes to 0x01.
        let packet = single_packet(&[0xc0, 0xdb, 0x01, 0x02, 0x03, 0x48, 0xc0]);
        assert_eq!(packet.command, 0x01);
        assert_eq!(&packet.payload[..], &[0x02, 0x03]);
    }

    #[test]
    fn escape_state_never_completes() {
        let mut decoder = PacketDecoder::new();
        decoder.decode_slice(&[0xc0, 0x01, 0xdb]).unwrap();
        assert_eq!(decoder.state(), DecoderState::InEscape);
        assert!(decoder.decode_byte(0xc0).unwrap().is_none());
        assert_eq!(decoder.state(), DecoderState::InPacket);
    }

    #[test]
    fn full_size_payload_fits() {
        let payload: Vec<u8> = (0..MAX_PAYLOAD).map(|i| (i % 0xb0) as u8).collect();
        let mut body = vec![0x10];
        body.extend(&payload);
        let crc = crc8(0, &body);

        let mut frame = vec![0xc0];
        frame.extend(&body);
        match crc {
            END => frame.extend([ESC, ESC_END]),
            ESC => frame.extend([ESC, ESC_ESC]),
            plain => frame.push(plain),
        }
        frame.push(0xc0);

        let packet = single_packet(&frame);
        assert_eq!(packet.payload.len(), MAX_PAYLOAD);
        assert_eq!(&packet.payload[..], &payload[..]);
    }

    #[test]
    fn oversize_frame_is_rejected() {
        let mut decoder = PacketDecoder::new();
        decoder.decode_byte(0xc0).unwrap();
        for _ in 0..BUFFER_CAPACITY {
            assert!(decoder.decode_byte(0x11).unwrap().is_none());
        }
        let err = decoder.decode_byte(0x11).unwrap_err();
        assert!(matches!(err, FrameError::TooMuchData { max: MAX_PAYLOAD }));
        assert_eq!(decoder.state(), DecoderState::Idle);

        // Rest of the oversize frame is skipped until the next delimiter.
        assert!(decoder.decode_byte(0x11).unwrap().is_none());
        let packets = decoder.decode_slice(&[0xc0, 0xc0, 0x01, 0x07, 0xc0]).unwrap();
        assert_eq!(packets.len(), 1);
    }

    #[test]
    fn escape_at_capacity_is_rejected() {
        let mut decoder = PacketDecoder::new();
        decoder.decode_byte(0xc0).unwrap();
        for _ in 0..BUFFER_CAPACITY {
            decoder.decode_byte(0x22).unwrap();
        }
        assert!(matches!(
            decoder.decode_byte(ESC),
            Err(FrameError::TooMuchData { .. })
        ));
    }

    #[test]
    fn consecutive_packets() {
        let mut decoder = PacketDecoder::new();
        let packets = decoder
            .decode_slice(&[0xc0, 0x01, 0x07, 0xc0, 0xc0, 0x01, 0x02, 0x1b, 0xc0])
            .unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(&packets[1].payload[..], &[0x02]);
    }
}
