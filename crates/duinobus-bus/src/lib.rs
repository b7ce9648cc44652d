//! Command/response bus over a framed byte transport.
//!
//! [`Bus`] is the host side: it sends commands and waits for their
//! responses while a background reader routes asynchronous device traffic
//! (`LOG` packets to `tracing`, `EVENT` packets to an event queue).
//! [`Device`] is the other end: it dispatches incoming commands to
//! [`PacketHandler`]s and writes their responses back.

pub mod bus;
pub mod config;
pub mod device;
pub mod error;
pub mod handler;
pub mod log;
pub mod reader;
pub mod writer;

pub use bus::Bus;
pub use config::{
    BusConfig, DEFAULT_POLL_INTERVAL, DEFAULT_QUEUE_CAPACITY, DEFAULT_RESPONSE_TIMEOUT, MIN_POLL_INTERVAL,
};
pub use device::Device;
pub use error::{BusError, Result};
pub use handler::{CorePacketHandler, Dispatcher, HandlerContext, PacketHandler, DEBUG_PACKETS};
pub use log::{log_packet, DeviceLog, Severity};
pub use reader::PacketReader;
pub use writer::PacketWriter;
