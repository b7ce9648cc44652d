mod cmd;
mod exit;
mod logging;
mod output;
mod target;

use std::path::PathBuf;

use clap::Parser;
use duinobus_bus::BusConfig;
use duinobus_transport::DEFAULT_BAUD;

use crate::cmd::{Command, Session};
use crate::exit::{bus_error, CliResult};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "duinobus", version, about = "Talk to a microcontroller over a framed command bus")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Bus settings file (JSON).
    #[arg(long, value_name = "FILE", env = "DUINOBUS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Dump every packet sent and received (needs --log-level debug).
    #[arg(long, global = true)]
    debug: bool,

    /// Serial line speed.
    #[arg(long, default_value_t = DEFAULT_BAUD, global = true)]
    baud: u32,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn session(&self) -> CliResult<Session> {
        let format = self.format.unwrap_or_else(OutputFormat::default_for_stdout);
        let mut session = Session::new(format);
        if let Some(path) = &self.config {
            session.config =
                BusConfig::from_file(path).map_err(|err| bus_error("bad config", err))?;
        }
        if self.debug {
            session.config.debug = true;
        }
        session.baud = self.baud;
        Ok(session)
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let result = cli.session().and_then(|session| cmd::run(cli.command, &session));

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
