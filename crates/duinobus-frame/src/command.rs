//! Reserved command identifiers.
//!
//! Commands 0x01-0x0F are reserved for built-in use.
//! Commands 0x10-0xFF are available for device-defined use.

/// Checks that the device is alive; the reply echoes the payload.
pub const PING: u8 = 0x01;

/// Sets the device debug flags (`u32`, bit 0 enables packet dumps).
pub const DEBUG: u8 = 0x02;

/// Asynchronous log message from the device: severity `u8` + string.
pub const LOG: u8 = 0x03;

/// Asynchronous application-defined event from the device.
pub const EVENT: u8 = 0x04;

/// First device-defined command ID.
pub const USER_COMMAND_START: u8 = 0x10;

/// Returns a human-readable name for a command ID.
pub fn command_name(id: u8) -> &'static str {
    match id {
        PING => "PING",
        DEBUG => "DEBUG",
        LOG => "LOG",
        EVENT => "EVENT",
        0x00 | 0x05..=0x0F => "RESERVED",
        _ => "USER",
    }
}

/// Returns true if the command is consumed by the bus rather than delivered
/// as a response.
pub fn is_async(id: u8) -> bool {
    matches!(id, LOG | EVENT)
}
