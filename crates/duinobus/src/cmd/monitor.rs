use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use duinobus_bus::Bus;
use duinobus_frame::Packet;
use duinobus_transport::ByteStream;
use tracing::info;

use crate::cmd::{install_ctrlc_handler, parse_duration, MonitorArgs, Session};
use crate::exit::{bus_error, CliResult, SUCCESS};
use crate::output::print_packet;

const MONITOR_POLL: Duration = Duration::from_millis(100);

/// Device log messages are not printed here; they come out on stderr
/// through the log subscriber.
pub fn run(args: MonitorArgs, session: &Session) -> CliResult<i32> {
    let deadline = args
        .duration
        .as_deref()
        .map(parse_duration)
        .transpose()?
        .map(|duration| Instant::now() + duration);
    let bus = session.open_bus(&args.target)?;

    let stop = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(stop.clone())?;
    info!(device = %args.target, "monitoring device traffic");

    let mut printed = 0usize;
    while !stop.load(Ordering::SeqCst) {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
        let Some((packet, kind)) =
            next_packet(&bus).map_err(|err| bus_error("receive failed", err))?
        else {
            continue;
        };

        print_packet(&packet, kind, None, session.format);
        printed = printed.saturating_add(1);
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    Ok(SUCCESS)
}

fn next_packet(bus: &Bus<ByteStream>) -> duinobus_bus::Result<Option<(Packet, &'static str)>> {
    if let Some(event) = bus.recv_event(MONITOR_POLL)? {
        return Ok(Some((event, "event")));
    }
    Ok(bus
        .recv_unsolicited(Duration::ZERO)?
        .map(|packet| (packet, "unsolicited")))
}
