use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use tracing::info;

use crate::error::{Result, TransportError};
use crate::stream::ByteStream;

/// Default serial line speed.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Serial tty setup: raw 8N1, no flow control, exclusive access.
pub struct SerialPort;

impl SerialPort {
    /// Open a serial device at `baud` and return it as a non-blocking stream.
    pub fn open(path: impl AsRef<Path>, baud: u32) -> Result<ByteStream> {
        let path = path.as_ref();
        let speed = baud_to_speed(baud)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| TransportError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        let fd = file.as_raw_fd();
        let configure_err = |source| TransportError::Configure {
            path: path.to_path_buf(),
            source,
        };

        // SAFETY: termios is a plain C struct; zeroed is a valid initial value
        // and tcgetattr overwrites it before use.
        let mut attr: libc::termios = unsafe { std::mem::zeroed() };
        // SAFETY: `fd` is an open descriptor owned by `file`, `attr` is writable.
        if unsafe { libc::tcgetattr(fd, &mut attr) } < 0 {
            return Err(configure_err(std::io::Error::last_os_error()));
        }

        attr.c_iflag = 0;
        attr.c_oflag = 0;
        attr.c_cflag = libc::CLOCAL | libc::CREAD | libc::CS8;
        attr.c_lflag = 0;
        attr.c_cc[libc::VTIME] = 0;
        attr.c_cc[libc::VMIN] = 1;

        // SAFETY: `attr` is a valid termios initialized by tcgetattr above.
        let rc = unsafe {
            libc::cfsetispeed(&mut attr, speed);
            libc::cfsetospeed(&mut attr, speed);
            libc::tcsetattr(fd, libc::TCSAFLUSH, &attr)
        };
        if rc < 0 {
            return Err(configure_err(std::io::Error::last_os_error()));
        }

        // SAFETY: TIOCEXCL takes no argument and `fd` is an open tty.
        if unsafe { libc::ioctl(fd, libc::TIOCEXCL as _) } < 0 {
            return Err(configure_err(std::io::Error::last_os_error()));
        }

        info!(?path, baud, "opened serial port");
        Ok(ByteStream::from_serial(file))
    }
}

fn baud_to_speed(baud: u32) -> Result<libc::speed_t> {
    let speed = match baud {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        _ => return Err(TransportError::UnsupportedBaud(baud)),
    };
    Ok(speed)
}
