use std::time::Instant;

use duinobus_frame::{Packet, PING};
use tracing::debug;

use crate::cmd::{PingArgs, Session};
use crate::exit::{bus_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::print_packet;

pub fn run(args: PingArgs, session: &Session) -> CliResult<i32> {
    let timeout = session.response_timeout(args.timeout.as_deref())?;
    let request = Packet::new(PING, args.data.unwrap_or_default().into_bytes());
    let bus = session.open_bus(&args.target)?;

    for seq in 0..args.count.max(1) {
        let started = Instant::now();
        let response = bus
            .send_command_and_await_response(&request, timeout)
            .map_err(|err| bus_error("ping failed", err))?;
        let rtt = started.elapsed();
        debug!(seq, ?rtt, "pong");

        check_echo(&request, &response)?;
        print_packet(&response, "response", Some(rtt), session.format);
    }

    Ok(SUCCESS)
}

fn check_echo(request: &Packet, response: &Packet) -> CliResult<()> {
    if response == request {
        return Ok(());
    }
    Err(CliError::new(
        DATA_INVALID,
        format!(
            "unexpected ping reply: command 0x{:02x} with {} bytes",
            response.command,
            response.payload.len()
        ),
    ))
}
