use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use duinobus_transport::{ByteListener, ByteStream, SerialPort};

use crate::exit::{transport_error, CliError, CliResult};

/// Where the other end of the bus lives.
///
/// `unix:PATH` and `tcp:HOST:PORT` name sockets; `serial:PATH` or a bare
/// path names a serial device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Serial(PathBuf),
    Unix(PathBuf),
    Tcp(String),
}

impl Target {
    pub fn connect(&self, baud: u32) -> CliResult<ByteStream> {
        let stream = match self {
            Target::Serial(path) => SerialPort::open(path, baud),
            Target::Unix(path) => ByteStream::connect_unix(path),
            Target::Tcp(addr) => ByteStream::connect_tcp(addr),
        };
        stream.map_err(|err| transport_error("connect failed", err))
    }

    pub fn listen(&self) -> CliResult<ByteListener> {
        let listener = match self {
            Target::Unix(path) => ByteListener::bind_unix(path),
            Target::Tcp(addr) => ByteListener::bind_tcp(addr),
            Target::Serial(_) => {
                return Err(CliError::usage("cannot listen on a serial device; use unix: or tcp:"));
            }
        };
        listener.map_err(|err| transport_error("bind failed", err))
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let non_empty = |rest: &str, what: &str| {
            if rest.is_empty() {
                Err(format!("missing {what} in target {input:?}"))
            } else {
                Ok(rest.to_string())
            }
        };

        if let Some(rest) = input.strip_prefix("unix:") {
            return non_empty(rest, "socket path").map(|p| Target::Unix(p.into()));
        }
        if let Some(rest) = input.strip_prefix("tcp:") {
            let addr = non_empty(rest, "address")?;
            if !addr.contains(':') {
                return Err(format!("tcp target needs HOST:PORT, got {addr:?}"));
            }
            return Ok(Target::Tcp(addr));
        }
        let path = input.strip_prefix("serial:").unwrap_or(input);
        non_empty(path, "device path").map(|p| Target::Serial(p.into()))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Serial(path) => write!(f, "serial:{}", path.display()),
            Target::Unix(path) => write!(f, "unix:{}", path.display()),
            Target::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::USAGE;

    #[test]
    fn parses_each_kind() {
        assert_eq!(
            "/dev/ttyACM0".parse::<Target>().unwrap(),
            Target::Serial("/dev/ttyACM0".into())
        );
        assert_eq!(
            "serial:/dev/ttyUSB1".parse::<Target>().unwrap(),
            Target::Serial("/dev/ttyUSB1".into())
        );
        assert_eq!(
            "unix:/tmp/bus.sock".parse::<Target>().unwrap(),
            Target::Unix("/tmp/bus.sock".into())
        );
        assert_eq!(
            "tcp:127.0.0.1:7000".parse::<Target>().unwrap(),
            Target::Tcp("127.0.0.1:7000".into())
        );
    }

    #[test]
    fn rejects_incomplete_targets() {
        assert!("unix:".parse::<Target>().is_err());
        assert!("tcp:localhost".parse::<Target>().is_err());
        assert!("".parse::<Target>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for text in ["unix:/tmp/a.sock", "tcp:localhost:9", "serial:/dev/ttyS0"] {
            assert_eq!(text.parse::<Target>().unwrap().to_string(), text);
        }
    }

    #[test]
    fn serial_cannot_listen() {
        let err = Target::Serial("/dev/ttyS0".into()).listen().unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
