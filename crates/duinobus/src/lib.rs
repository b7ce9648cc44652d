//! Framed command/response bus for talking to microcontrollers.
//!
//! A host and a device exchange SLIP-style frames, each carrying a command
//! byte, a payload, and a CRC-8. The host sends a command and blocks for the
//! response; meanwhile the device may push log messages and events at any
//! time.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-level transports (serial tty, TCP, Unix sockets)
//! - [`frame`]: packet model, frame encoder/decoder, payload packing
//! - [`bus`]: host-side `Bus` and device-side `Device` (behind the `bus` feature)

/// Re-export transport types.
pub mod transport {
    pub use duinobus_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use duinobus_frame::*;
}

/// Re-export bus types (requires `bus` feature).
#[cfg(feature = "bus")]
pub mod bus {
    pub use duinobus_bus::*;
}
