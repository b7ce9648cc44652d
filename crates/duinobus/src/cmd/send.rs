use std::time::Instant;

use duinobus_frame::{command_name, is_async, Packet};

use crate::cmd::{parse_hex, SendArgs, Session};
use crate::exit::{bus_error, CliError, CliResult, SUCCESS};
use crate::output::print_packet;

pub fn run(args: SendArgs, session: &Session) -> CliResult<i32> {
    if is_async(args.command) && !args.no_wait {
        return Err(CliError::usage(format!(
            "{} packets never produce a response; use --no-wait",
            command_name(args.command)
        )));
    }
    let timeout = session.response_timeout(args.timeout.as_deref())?;
    let packet = Packet::new(args.command, resolve_payload(&args)?);
    let bus = session.open_bus(&args.target)?;

    if args.no_wait {
        bus.send_packet(&packet)
            .map_err(|err| bus_error("send failed", err))?;
        return Ok(SUCCESS);
    }

    let started = Instant::now();
    let response = bus
        .send_command_and_await_response(&packet, timeout)
        .map_err(|err| bus_error("send failed", err))?;
    print_packet(&response, "response", Some(started.elapsed()), session.format);

    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(hex) = &args.hex {
        return parse_hex(hex);
    }
    Ok(Vec::new())
}
