use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::ByteTransport;

/// Default time a single byte write may wait for room in the output buffer.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// Configuration for a [`ByteStream`].
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Maximum time `write_byte` waits for the descriptor to become writable.
    pub write_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// A non-blocking, descriptor-backed byte stream.
///
/// Wraps a Unix domain socket, a TCP socket, or a serial tty. Readiness is
/// checked with `poll(2)`, so every operation is bounded.
pub struct ByteStream {
    inner: ByteStreamInner,
    config: StreamConfig,
    open: bool,
}

enum ByteStreamInner {
    Unix(UnixStream),
    Tcp(TcpStream),
    Serial(File),
}

impl ByteStream {
    fn from_inner(inner: ByteStreamInner) -> Self {
        Self {
            inner,
            config: StreamConfig::default(),
            open: true,
        }
    }

    pub(crate) fn from_unix(stream: UnixStream) -> Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self::from_inner(ByteStreamInner::Unix(stream)))
    }

    pub(crate) fn from_tcp(stream: TcpStream) -> Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self::from_inner(ByteStreamInner::Tcp(stream)))
    }

    /// The file must already have been opened with `O_NONBLOCK`.
    pub(crate) fn from_serial(file: File) -> Self {
        Self::from_inner(ByteStreamInner::Serial(file))
    }

    /// Connect to a listening Unix domain socket.
    pub fn connect_unix(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|source| TransportError::Connect {
            addr: path.display().to_string(),
            source,
        })?;
        debug!(?path, "connected to unix domain socket");
        Self::from_unix(stream)
    }

    /// Connect to a TCP endpoint (`host:port`).
    pub fn connect_tcp(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).map_err(|source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        debug!(addr, "connected to tcp endpoint");
        Self::from_tcp(stream)
    }

    /// Create a connected pair of streams (Unix socketpair).
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = UnixStream::pair()?;
        Ok((Self::from_unix(left)?, Self::from_unix(right)?))
    }

    /// Replace the stream configuration.
    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Current stream configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Short name of the underlying transport, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            ByteStreamInner::Unix(_) => "unix",
            ByteStreamInner::Tcp(_) => "tcp",
            ByteStreamInner::Serial(_) => "serial",
        }
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            ByteStreamInner::Unix(stream) => stream.read(buf),
            ByteStreamInner::Tcp(stream) => stream.read(buf),
            ByteStreamInner::Serial(file) => file.read(buf),
        }
    }

    fn write_raw(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            ByteStreamInner::Unix(stream) => stream.write(buf),
            ByteStreamInner::Tcp(stream) => stream.write(buf),
            ByteStreamInner::Serial(file) => file.write(buf),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(TransportError::Shutdown)
        }
    }
}

impl AsRawFd for ByteStream {
    fn as_raw_fd(&self) -> RawFd {
        match &self.inner {
            ByteStreamInner::Unix(stream) => stream.as_raw_fd(),
            ByteStreamInner::Tcp(stream) => stream.as_raw_fd(),
            ByteStreamInner::Serial(file) => file.as_raw_fd(),
        }
    }
}

impl ByteTransport for ByteStream {
    fn is_open(&self) -> bool {
        self.open
    }

    fn is_data_available(&self) -> bool {
        self.open
            && poll_fd(self.as_raw_fd(), libc::POLLIN, Duration::ZERO)
                .map(|revents| revents & libc::POLLIN != 0)
                .unwrap_or(false)
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        self.ensure_open()?;
        let mut buf = [0u8; 1];
        loop {
            match self.read_raw(&mut buf) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(_) => return Ok(Some(buf[0])),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn is_space_available(&self) -> bool {
        self.open
            && poll_fd(self.as_raw_fd(), libc::POLLOUT, Duration::ZERO)
                .map(|revents| revents & libc::POLLOUT != 0)
                .unwrap_or(false)
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.ensure_open()?;
        let timeout = self.config.write_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            match self.write_raw(&[byte]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(_) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(TransportError::WriteTimeout(timeout));
                    }
                    let revents = poll_fd(self.as_raw_fd(), libc::POLLOUT, deadline - now)?;
                    if revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
                        return Err(TransportError::PollError(revents));
                    }
                }
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                    return Err(TransportError::Closed)
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn poll_readable(&self, timeout: Duration) -> Result<bool> {
        self.ensure_open()?;
        let revents = poll_fd(self.as_raw_fd(), libc::POLLIN, timeout)?;
        if revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
            return Err(TransportError::PollError(revents));
        }
        // A hang-up is reported as readable so the next read observes EOF.
        Ok(revents & (libc::POLLIN | libc::POLLHUP) != 0)
    }

    fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            ByteStreamInner::Unix(stream) => ByteStreamInner::Unix(stream.try_clone()?),
            ByteStreamInner::Tcp(stream) => ByteStreamInner::Tcp(stream.try_clone()?),
            ByteStreamInner::Serial(file) => ByteStreamInner::Serial(file.try_clone()?),
        };
        Ok(Self {
            inner,
            config: self.config.clone(),
            open: self.open,
        })
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let shutdown = match &self.inner {
            ByteStreamInner::Unix(stream) => stream.shutdown(Shutdown::Both),
            ByteStreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
            ByteStreamInner::Serial(_) => Ok(()),
        };
        match shutdown {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotConnected => {}
            Err(err) => return Err(TransportError::Io(err)),
        }
        debug!(kind = self.kind(), "transport closed");
        Ok(())
    }
}

impl std::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStream")
            .field("type", &self.kind())
            .field("fd", &self.as_raw_fd())
            .field("open", &self.open)
            .finish()
    }
}

/// Poll a single descriptor, returning the reported events (0 on timeout).
fn poll_fd(fd: RawFd, events: libc::c_short, timeout: Duration) -> Result<libc::c_short> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    // SAFETY: `pfd` is a valid, writable pollfd and the count passed is 1.
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == ErrorKind::Interrupted {
            return Ok(0);
        }
        return Err(TransportError::Io(err));
    }
    Ok(pfd.revents)
}
