//! Byte-level transports for duinobus.
//!
//! The bus talks to a device through the poll-style [`ByteTransport`]
//! contract: is-data-available, read-byte, is-space-available, write-byte.
//! [`ByteStream`] implements it over a serial tty, a TCP socket, or a Unix
//! domain socket.
//!
//! This is the lowest layer of duinobus.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod listener;
#[cfg(unix)]
pub mod serial;
#[cfg(unix)]
pub mod stream;

pub use error::{Result, TransportError};
pub use traits::ByteTransport;

#[cfg(unix)]
pub use listener::ByteListener;
#[cfg(unix)]
pub use serial::{SerialPort, DEFAULT_BAUD};
#[cfg(unix)]
pub use stream::{ByteStream, StreamConfig, DEFAULT_WRITE_TIMEOUT};
