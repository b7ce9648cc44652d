use std::time::Duration;

use crate::error::Result;

/// Poll-style byte I/O that the bus is written against.
///
/// None of these methods block indefinitely. `read_byte` returns `Ok(None)`
/// when nothing is pending; `poll_readable` waits at most `timeout`.
/// Implementations must be cloneable into an independent handle so that one
/// thread can read while another writes.
pub trait ByteTransport: Send + 'static {
    /// Returns true until the transport has been closed locally.
    fn is_open(&self) -> bool;

    /// Returns true if at least one byte can be read without blocking.
    fn is_data_available(&self) -> bool;

    /// Read a single byte if one is pending.
    ///
    /// Returns `Err(TransportError::Closed)` once the peer has gone away.
    fn read_byte(&mut self) -> Result<Option<u8>>;

    /// Returns true if a byte can be written without blocking.
    fn is_space_available(&self) -> bool;

    /// Write a single byte, waiting a bounded time for room.
    fn write_byte(&mut self, byte: u8) -> Result<()>;

    /// Wait up to `timeout` for the transport to become readable.
    ///
    /// Returns `Ok(false)` on timeout. Error conditions reported by the
    /// underlying descriptor surface as `Err`.
    fn poll_readable(&self, timeout: Duration) -> Result<bool>;

    /// Create an independent handle to the same underlying stream.
    fn try_clone(&self) -> Result<Self>
    where
        Self: Sized;

    /// Release the transport. Further writes fail with `Shutdown`.
    fn close(&mut self) -> Result<()>;
}
