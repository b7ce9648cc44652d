use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use duinobus_frame::{command_name, Packet, EVENT, LOG};
use duinobus_transport::{ByteTransport, TransportError};
use tracing::{debug, error, info, warn};

use crate::config::BusConfig;
use crate::error::{BusError, Result};
use crate::log;
use crate::reader::PacketReader;
use crate::writer::PacketWriter;

type SharedReader<T> = Arc<Mutex<Option<PacketReader<T>>>>;

/// Host end of a bus.
///
/// Once opened, a background thread owns the read side of the transport.
/// It decodes every incoming frame and routes it: `LOG` packets go to
/// `tracing`, `EVENT` packets to the event queue, everything else to the
/// response queue consumed by [`send_command_and_await_response`].
///
/// All methods take `&self`; share a bus between threads with an `Arc`.
/// Requests are serialized, so concurrent callers each get their own
/// response.
///
/// [`send_command_and_await_response`]: Bus::send_command_and_await_response
pub struct Bus<T: ByteTransport> {
    config: BusConfig,
    open: Arc<AtomicBool>,
    writer: Mutex<Option<PacketWriter<T>>>,
    reader: SharedReader<T>,
    responses: Mutex<Option<Receiver<Packet>>>,
    events: Mutex<Option<Receiver<Packet>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<T: ByteTransport> Bus<T> {
    /// Create a closed bus.
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            open: Arc::new(AtomicBool::new(false)),
            writer: Mutex::new(None),
            reader: Arc::new(Mutex::new(None)),
            responses: Mutex::new(None),
            events: Mutex::new(None),
            thread: Mutex::new(None),
        }
    }

    /// Create a bus and open it on `transport`.
    pub fn connect(transport: T, config: BusConfig) -> Result<Self> {
        let bus = Self::new(config);
        bus.open(transport)?;
        Ok(bus)
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Take ownership of `transport` and start the background reader.
    pub fn open(&self, transport: T) -> Result<()> {
        self.config.validate()?;
        let mut thread = lock(&self.thread, "thread")?;
        if thread.is_some() || self.is_open() {
            return Err(BusError::AlreadyOpen);
        }

        let poller = transport.try_clone()?;
        let mut reader = PacketReader::new(transport.try_clone()?);
        let mut writer = PacketWriter::new(transport);
        reader.set_debug(self.config.debug);
        writer.set_debug(self.config.debug);

        let (response_tx, response_rx) = mpsc::sync_channel(self.config.queue_capacity);
        let (event_tx, event_rx) = mpsc::sync_channel(self.config.queue_capacity);

        *lock(&self.reader, "reader")? = Some(reader);
        *lock(&self.writer, "writer")? = Some(writer);
        *lock(&self.responses, "response")? = Some(response_rx);
        *lock(&self.events, "event")? = Some(event_rx);
        self.open.store(true, Ordering::Release);

        let task = ReaderTask {
            poller,
            reader: Arc::clone(&self.reader),
            open: Arc::clone(&self.open),
            responses: response_tx,
            events: event_tx,
            poll_interval: self.config.poll_interval,
        };
        let spawned = std::thread::Builder::new()
            .name("duinobus-reader".into())
            .spawn(move || task.run());
        match spawned {
            Ok(handle) => *thread = Some(handle),
            Err(err) => {
                drop(thread);
                self.close()?;
                return Err(TransportError::Io(err).into());
            }
        }

        info!("bus opened");
        Ok(())
    }

    /// Stop the reader and release the transport. Closing twice is harmless.
    ///
    /// Any caller blocked in [`send_command_and_await_response`] wakes up with
    /// [`BusError::NotOpen`].
    ///
    /// [`send_command_and_await_response`]: Bus::send_command_and_await_response
    pub fn close(&self) -> Result<()> {
        let was_open = self.open.swap(false, Ordering::AcqRel);

        // Shutting the socket down wakes the reader out of its poll.
        let close_result = match lock_or_recover(&self.writer).take() {
            Some(mut writer) => writer.close(),
            None => Ok(()),
        };

        if let Some(handle) = lock_or_recover(&self.thread).take() {
            if handle.join().is_err() {
                error!("bus reader thread panicked");
            }
        }

        lock_or_recover(&self.reader).take();
        lock_or_recover(&self.responses).take();
        lock_or_recover(&self.events).take();

        if was_open {
            info!("bus closed");
        }
        close_result
    }

    /// Encode `packet` and write it to the transport.
    ///
    /// A transport error aborts the write but leaves the bus open.
    pub fn send_packet(&self, packet: &Packet) -> Result<()> {
        let mut writer = lock(&self.writer, "writer")?;
        let writer = writer.as_mut().ok_or(BusError::NotOpen)?;
        writer.send(packet)
    }

    /// Send a command and wait up to `timeout` for its response.
    ///
    /// Only one request is in flight at a time; other callers block until
    /// it completes. Responses left over from earlier requests that timed
    /// out are discarded before sending.
    pub fn send_command_and_await_response(&self, packet: &Packet, timeout: Duration) -> Result<Packet> {
        if !self.is_open() {
            return Err(BusError::NotOpen);
        }
        let responses = lock(&self.responses, "response")?;
        let responses = responses.as_ref().ok_or(BusError::NotOpen)?;

        for stale in responses.try_iter() {
            debug!(
                command = format_args!("0x{:02x}", stale.command),
                len = stale.payload.len(),
                "discarding unclaimed response"
            );
        }

        self.send_packet(packet)?;

        match responses.recv_timeout(timeout) {
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) => {
                debug!(
                    command = format_args!("0x{:02x}", packet.command),
                    ?timeout,
                    "no response"
                );
                Err(BusError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(self.stopped_error()),
        }
    }

    /// [`send_command_and_await_response`](Self::send_command_and_await_response)
    /// with the configured response timeout.
    pub fn send_command(&self, packet: &Packet) -> Result<Packet> {
        self.send_command_and_await_response(packet, self.config.response_timeout)
    }

    /// Wait up to `timeout` for the next device event.
    pub fn recv_event(&self, timeout: Duration) -> Result<Option<Packet>> {
        let events = lock(&self.events, "event")?;
        let events = events.as_ref().ok_or(BusError::NotOpen)?;
        self.recv_queued(events, timeout)
    }

    /// Wait up to `timeout` for a response nobody asked for.
    pub fn recv_unsolicited(&self, timeout: Duration) -> Result<Option<Packet>> {
        let responses = lock(&self.responses, "response")?;
        let responses = responses.as_ref().ok_or(BusError::NotOpen)?;
        self.recv_queued(responses, timeout)
    }

    fn recv_queued(&self, queue: &Receiver<Packet>, timeout: Duration) -> Result<Option<Packet>> {
        match queue.recv_timeout(timeout) {
            Ok(packet) => Ok(Some(packet)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(self.stopped_error()),
        }
    }

    /// Read one pending byte and feed it to the decoder.
    ///
    /// Packets completed here bypass routing and are returned directly.
    /// While the background reader is running it competes for the same
    /// bytes, so this is mainly useful for stepping a bus by hand.
    pub fn process_byte(&self) -> Result<Option<Packet>> {
        let mut reader = lock(&self.reader, "reader")?;
        reader.as_mut().ok_or(BusError::NotOpen)?.process_byte()
    }

    /// Toggle packet dumps on both directions.
    pub fn set_debug(&self, debug: bool) -> Result<()> {
        if let Some(writer) = lock(&self.writer, "writer")?.as_mut() {
            writer.set_debug(debug);
        }
        if let Some(reader) = lock(&self.reader, "reader")?.as_mut() {
            reader.set_debug(debug);
        }
        Ok(())
    }

    fn stopped_error(&self) -> BusError {
        if self.is_open() {
            BusError::Disconnected
        } else {
            BusError::NotOpen
        }
    }
}

impl<T: ByteTransport> Drop for Bus<T> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            debug!(error = %err, "error closing bus on drop");
        }
    }
}

impl<T: ByteTransport> std::fmt::Debug for Bus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("open", &self.is_open())
            .field("config", &self.config)
            .finish()
    }
}

struct ReaderTask<T> {
    poller: T,
    reader: SharedReader<T>,
    open: Arc<AtomicBool>,
    responses: SyncSender<Packet>,
    events: SyncSender<Packet>,
    poll_interval: Duration,
}

impl<T: ByteTransport> ReaderTask<T> {
    fn run(self) {
        debug!("bus reader started");
        while self.open.load(Ordering::Acquire) {
            match self.poller.poll_readable(self.poll_interval) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    self.stopped(&err);
                    break;
                }
            }

            let mut reader = lock_or_recover(&self.reader);
            let Some(reader) = reader.as_mut() else {
                break;
            };
            if let Err(err) = reader.read_available(|packet| self.route(packet)) {
                self.stopped(&err);
                break;
            }
        }
        debug!("bus reader stopped");
    }

    fn stopped(&self, err: &TransportError) {
        if self.open.load(Ordering::Acquire) {
            error!(error = %err, "bus transport failed; reader stopping");
        }
    }

    fn route(&self, packet: Packet) {
        match packet.command {
            LOG => log::emit(&packet),
            EVENT => deliver(&self.events, packet, "event"),
            _ => deliver(&self.responses, packet, "response"),
        }
    }
}

fn deliver(queue: &SyncSender<Packet>, packet: Packet, queue_name: &'static str) {
    match queue.try_send(packet) {
        Ok(()) => {}
        Err(TrySendError::Full(packet)) => warn!(
            queue = queue_name,
            command = format_args!("0x{:02x}", packet.command),
            name = command_name(packet.command),
            "queue full, dropping packet"
        ),
        Err(TrySendError::Disconnected(_)) => {
            debug!(queue = queue_name, "queue closed, dropping packet")
        }
    }
}

fn lock<'a, U>(mutex: &'a Mutex<U>, what: &'static str) -> Result<MutexGuard<'a, U>> {
    mutex.lock().map_err(|_| BusError::LockPoisoned(what))
}

fn lock_or_recover<U>(mutex: &Mutex<U>) -> MutexGuard<'_, U> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
