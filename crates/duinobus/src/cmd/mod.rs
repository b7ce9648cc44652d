use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use duinobus_bus::{Bus, BusConfig};
use duinobus_transport::{ByteStream, DEFAULT_BAUD};

use crate::exit::{bus_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;
use crate::target::Target;

pub mod monitor;
pub mod ping;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that a device answers, and measure the round trip.
    Ping(PingArgs),
    /// Send one command and print the response.
    Send(SendArgs),
    /// Print device events and unsolicited packets as they arrive.
    Monitor(MonitorArgs),
    /// Act as a device: answer PING and DEBUG on a socket.
    Serve(ServeArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings shared by every subcommand that opens a bus.
#[derive(Debug, Clone)]
pub struct Session {
    pub format: OutputFormat,
    pub config: BusConfig,
    pub baud: u32,
}

impl Session {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            config: BusConfig::default(),
            baud: DEFAULT_BAUD,
        }
    }

    pub fn open_bus(&self, target: &Target) -> CliResult<Bus<ByteStream>> {
        let stream = target.connect(self.baud)?;
        Bus::connect(stream, self.config.clone()).map_err(|err| bus_error("open failed", err))
    }

    /// `--timeout` if given, otherwise the configured response timeout.
    pub fn response_timeout(&self, timeout: Option<&str>) -> CliResult<Duration> {
        match timeout {
            Some(text) => parse_duration(text),
            None => Ok(self.config.response_timeout),
        }
    }
}

pub fn run(command: Command, session: &Session) -> CliResult<i32> {
    match command {
        Command::Ping(args) => ping::run(args, session),
        Command::Send(args) => send::run(args, session),
        Command::Monitor(args) => monitor::run(args, session),
        Command::Serve(args) => serve::run(args, session),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct PingArgs {
    /// Device to talk to: a serial path, unix:PATH, or tcp:HOST:PORT.
    pub target: Target,
    /// Payload to echo back.
    #[arg(long)]
    pub data: Option<String>,
    /// Number of pings to send.
    #[arg(long, short = 'c', default_value = "1")]
    pub count: u32,
    /// Response timeout (e.g. 2s, 500ms). Defaults to the configured value.
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Device to talk to: a serial path, unix:PATH, or tcp:HOST:PORT.
    pub target: Target,
    /// Command byte, decimal or 0x-prefixed hex.
    #[arg(long, short = 'c', value_parser = parse_command_id)]
    pub command: u8,
    /// String payload.
    #[arg(long, conflicts_with = "hex")]
    pub data: Option<String>,
    /// Hex payload, e.g. "01 02 ff" or "0102ff".
    #[arg(long, conflicts_with = "data")]
    pub hex: Option<String>,
    /// Send without waiting for a response.
    #[arg(long)]
    pub no_wait: bool,
    /// Response timeout (e.g. 2s, 500ms). Defaults to the configured value.
    #[arg(long, conflicts_with = "no_wait")]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Device to talk to: a serial path, unix:PATH, or tcp:HOST:PORT.
    pub target: Target,
    /// Exit after printing N packets.
    #[arg(long)]
    pub count: Option<usize>,
    /// Exit after this long (e.g. 30s).
    #[arg(long)]
    pub duration: Option<String>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket to listen on: unix:PATH or tcp:HOST:PORT.
    pub target: Target,
    /// Echo back any device-defined command (0x10 and up).
    #[arg(long)]
    pub echo: bool,
    /// Send an EVENT carrying a counter at this interval (e.g. 1s).
    #[arg(long)]
    pub heartbeat: Option<String>,
    /// Exit after the first host disconnects.
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub fn parse_command_id(input: &str) -> Result<u8, String> {
    let input = input.trim();
    let parsed = match input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("command must be 0-255 or 0x00-0xff, got {input:?}"))
}

pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != ',')
        .collect();
    if !digits.is_ascii() {
        return Err(CliError::usage("hex payload must be ASCII hex digits"));
    }
    if digits.len() % 2 != 0 {
        return Err(CliError::usage("hex payload needs an even number of digits"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|idx| {
            u8::from_str_radix(&digits[idx..idx + 2], 16)
                .map_err(|_| CliError::usage(format!("invalid hex byte {:?}", &digits[idx..idx + 2])))
        })
        .collect()
}

/// Set `stop` on Ctrl-C.
pub fn install_ctrlc_handler(stop: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
