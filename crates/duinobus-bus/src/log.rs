//! Device log messages carried in `LOG` packets.
//!
//! Payload: a severity byte followed by a length-prefixed string.

use duinobus_frame::{Packet, Packer, UnpackError, LOG, MAX_PAYLOAD};
use tracing::{debug, error, info, trace, warn, Level};

/// Tracing target for messages forwarded from the device.
pub const DEVICE_TARGET: &str = "duinobus::device";

/// Severity as encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Severity {
    None = 0,
    Fatal = 1,
    Error = 2,
    Warning = 3,
    Info = 4,
    Debug = 5,
}

impl Severity {
    /// Decode a wire severity, or `None` for values outside the table.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Severity::None),
            1 => Some(Severity::Fatal),
            2 => Some(Severity::Error),
            3 => Some(Severity::Warning),
            4 => Some(Severity::Info),
            5 => Some(Severity::Debug),
            _ => None,
        }
    }

    /// The `tracing` level a device message of this severity is logged at.
    pub fn level(self) -> Level {
        match self {
            Severity::None => Level::TRACE,
            Severity::Fatal | Severity::Error => Level::ERROR,
            Severity::Warning => Level::WARN,
            Severity::Info => Level::INFO,
            Severity::Debug => Level::DEBUG,
        }
    }
}

/// Map a raw wire severity to a level; out-of-range values log as errors.
pub fn level_for(severity: u8) -> Level {
    Severity::from_u8(severity).map_or(Level::ERROR, Severity::level)
}

/// A decoded device log message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLog {
    pub severity: u8,
    pub message: String,
}

impl DeviceLog {
    pub fn level(&self) -> Level {
        level_for(self.severity)
    }
}

/// Decode the payload of a `LOG` packet.
pub fn parse(packet: &Packet) -> Result<DeviceLog, UnpackError> {
    let mut unpacker = packet.unpacker();
    let severity = unpacker.unpack_u8()?;
    let message = unpacker.unpack_str()?.to_string();
    Ok(DeviceLog { severity, message })
}

/// Emit a `LOG` packet through `tracing` at its mapped level.
pub fn emit(packet: &Packet) {
    let log = match parse(packet) {
        Ok(log) => log,
        Err(err) => {
            warn!(error = %err, len = packet.payload.len(), "malformed device log packet");
            return;
        }
    };
    let message = log.message.as_str();
    let severity = log.severity;
    match Severity::from_u8(severity) {
        Some(Severity::None) => trace!(target: DEVICE_TARGET, severity, "{message}"),
        Some(Severity::Debug) => debug!(target: DEVICE_TARGET, severity, "{message}"),
        Some(Severity::Info) => info!(target: DEVICE_TARGET, severity, "{message}"),
        Some(Severity::Warning) => warn!(target: DEVICE_TARGET, severity, "{message}"),
        Some(Severity::Fatal | Severity::Error) | None => {
            error!(target: DEVICE_TARGET, severity, "{message}")
        }
    }
}

/// Build a `LOG` packet, truncating `message` to what fits.
pub fn log_packet(severity: Severity, message: &str) -> Packet {
    // severity byte + length byte + NUL
    let max_text = (MAX_PAYLOAD - 3).min(u8::MAX as usize - 1);
    let mut end = message.len().min(max_text);
    while !message.is_char_boundary(end) {
        end -= 1;
    }

    let mut packer = Packer::new();
    let packed = packer
        .pack_u8(severity as u8)
        .and_then(|p| p.pack_str(&message[..end]))
        .is_ok();
    debug_assert!(packed);
    packer.into_packet(LOG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_table() {
        assert_eq!(level_for(0), Level::TRACE);
        assert_eq!(level_for(1), Level::ERROR);
        assert_eq!(level_for(2), Level::ERROR);
        assert_eq!(level_for(3), Level::WARN);
        assert_eq!(level_for(4), Level::INFO);
        assert_eq!(level_for(5), Level::DEBUG);
        assert_eq!(level_for(6), Level::ERROR);
        assert_eq!(level_for(0xff), Level::ERROR);
    }

    #[test]
    fn log_packet_layout() {
        let packet = log_packet(Severity::Warning, "low battery");
        assert_eq!(packet.command, LOG);
        assert_eq!(packet.payload[0], 3);
        assert_eq!(packet.payload[1] as usize, "low battery".len() + 1);
        assert_eq!(*packet.payload.last().unwrap(), 0);

        let log = parse(&packet).unwrap();
        assert_eq!(log.severity, 3);
        assert_eq!(log.message, "low battery");
        assert_eq!(log.level(), Level::WARN);
    }

    #[test]
    fn long_messages_are_truncated() {
        let text = "é".repeat(200);
        let packet = log_packet(Severity::Info, &text);
        assert!(packet.payload.len() <= MAX_PAYLOAD);

        let log = parse(&packet).unwrap();
        assert!(log.message.len() <= 254);
        assert!(text.starts_with(&log.message));
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let packet = Packet::new(LOG, vec![4u8, 10, b'a']);
        assert!(matches!(parse(&packet), Err(UnpackError::Underflow { .. })));
        // Emitting a malformed packet must not panic.
        emit(&packet);
    }
}
