use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use duinobus_frame::{Packet, EVENT};
use duinobus_transport::{ByteTransport, TransportError};
use tracing::{debug, info};

use crate::config::DEFAULT_POLL_INTERVAL;
use crate::error::{BusError, Result};
use crate::handler::{Dispatcher, HandlerContext};
use crate::log::{log_packet, Severity};
use crate::reader::PacketReader;
use crate::writer::PacketWriter;

/// The device end of a bus: receives commands, dispatches them, replies.
///
/// Also originates the asynchronous traffic a host sees: log messages and
/// events.
pub struct Device<T> {
    reader: PacketReader<T>,
    writer: PacketWriter<T>,
    dispatcher: Dispatcher,
    ctx: HandlerContext,
    poll_interval: Duration,
}

impl<T: ByteTransport> Device<T> {
    pub fn new(transport: T, dispatcher: Dispatcher) -> Result<Self> {
        let reader = PacketReader::new(transport.try_clone()?);
        Ok(Self {
            reader,
            writer: PacketWriter::new(transport),
            dispatcher,
            ctx: HandlerContext::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// How often `serve` checks its stop flag.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn debug(&self) -> bool {
        self.ctx.debug
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.ctx.debug = debug;
        self.apply_debug();
    }

    fn apply_debug(&mut self) {
        self.reader.set_debug(self.ctx.debug);
        self.writer.set_debug(self.ctx.debug);
    }

    /// Send a log message to the host.
    pub fn log(&mut self, severity: Severity, message: &str) -> Result<()> {
        self.writer.send(&log_packet(severity, message))
    }

    /// Send an event to the host.
    pub fn send_event(&mut self, payload: impl Into<Bytes>) -> Result<()> {
        self.writer.send(&Packet::new(EVENT, payload))
    }

    /// Wait up to `timeout` for one command and answer it.
    ///
    /// Returns `Ok(true)` if a command was processed.
    pub fn poll_once(&mut self, timeout: Duration) -> Result<bool> {
        let Some(packet) = self.reader.read_packet(timeout)? else {
            return Ok(false);
        };
        let response = self.dispatcher.dispatch(&packet, &mut self.ctx);
        // DEBUG may have flipped the dump flag; apply it before replying.
        self.apply_debug();
        if let Some(response) = response {
            self.writer.send(&response)?;
        }
        Ok(true)
    }

    /// Service commands until `stop` is set or the host disconnects.
    pub fn serve(&mut self, stop: &AtomicBool) -> Result<()> {
        info!("device serving");
        while !stop.load(Ordering::Acquire) {
            match self.poll_once(self.poll_interval) {
                Ok(_) => {}
                Err(BusError::Transport(TransportError::Closed)) => {
                    info!("host disconnected");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
        debug!("device stop requested");
        Ok(())
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Close the device's transport.
    pub fn close(&mut self) -> Result<()> {
        self.writer.close()
    }
}
