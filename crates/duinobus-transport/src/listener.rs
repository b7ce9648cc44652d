use std::net::{SocketAddr, TcpListener};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::ByteStream;

/// Accepts incoming byte-stream connections, for the device side of a bus.
///
/// Binding a Unix socket removes a stale socket at the same path first and
/// cleans the socket file up again on drop.
#[derive(Debug)]
pub struct ByteListener {
    inner: ListenerInner,
}

#[derive(Debug)]
enum ListenerInner {
    Unix {
        listener: UnixListener,
        path: PathBuf,
        created_inode: Option<(u64, u64)>,
    },
    Tcp(TcpListener),
}

impl ByteListener {
    /// Bind and listen on a TCP address (`host:port`).
    pub fn bind_tcp(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        info!(addr = ?listener.local_addr().ok(), "listening on tcp");
        Ok(Self {
            inner: ListenerInner::Tcp(listener),
        })
    }

    /// Bind and listen on a filesystem-path Unix domain socket.
    pub fn bind_unix(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bind_err = |source| TransportError::Bind {
            addr: path.display().to_string(),
            source,
        };

        // Remove a stale socket, but never a non-socket file.
        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(bind_err)?;
            if !metadata.file_type().is_socket() {
                return Err(bind_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        let metadata = std::fs::symlink_metadata(&path).map_err(bind_err)?;
        info!(?path, "listening on unix domain socket");

        Ok(Self {
            inner: ListenerInner::Unix {
                listener,
                created_inode: Some((metadata.dev(), metadata.ino())),
                path,
            },
        })
    }

    /// Accept one incoming connection (blocking).
    pub fn accept(&self) -> Result<ByteStream> {
        match &self.inner {
            ListenerInner::Unix { listener, .. } => {
                let (stream, _addr) = listener.accept().map_err(TransportError::Accept)?;
                debug!("accepted unix connection");
                ByteStream::from_unix(stream)
            }
            ListenerInner::Tcp(listener) => {
                let (stream, addr) = listener.accept().map_err(TransportError::Accept)?;
                info!(%addr, "accepted tcp connection");
                ByteStream::from_tcp(stream)
            }
        }
    }

    /// The bound TCP address, if this is a TCP listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.inner {
            ListenerInner::Tcp(listener) => listener.local_addr().ok(),
            ListenerInner::Unix { .. } => None,
        }
    }

    /// The bound socket path, if this is a Unix listener.
    pub fn path(&self) -> Option<&Path> {
        match &self.inner {
            ListenerInner::Unix { path, .. } => Some(path),
            ListenerInner::Tcp(_) => None,
        }
    }
}

impl Drop for ByteListener {
    fn drop(&mut self) {
        let ListenerInner::Unix {
            path,
            created_inode: Some((expected_dev, expected_ino)),
            ..
        } = &self.inner
        else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == *expected_dev
                && metadata.ino() == *expected_ino
            {
                debug!(?path, "cleaning up socket file");
                let _ = std::fs::remove_file(path);
            } else {
                debug!(?path, "socket path identity changed; skipping cleanup");
            }
        }
    }
}
