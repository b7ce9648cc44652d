use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use duinobus_bus::{BusError, Device, Dispatcher, HandlerContext, PacketHandler, Severity};
use duinobus_frame::{Packer, Packet, USER_COMMAND_START};
use duinobus_transport::{ByteStream, TransportError};
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, parse_duration, ServeArgs, Session};
use crate::exit::{CliResult, SUCCESS};

const SERVE_POLL: Duration = Duration::from_millis(100);

/// Answers every device-defined command with a copy of itself.
#[derive(Debug, Default)]
pub struct EchoHandler;

impl PacketHandler for EchoHandler {
    fn handle(&mut self, packet: &Packet, _ctx: &mut HandlerContext) -> Option<Packet> {
        (packet.command >= USER_COMMAND_START).then(|| packet.clone())
    }

    fn command_name(&self, command: u8) -> Option<&'static str> {
        (command >= USER_COMMAND_START).then_some("ECHO")
    }
}

/// Hosts are served one at a time. Ctrl-C is noticed between packets, or
/// once the next host connects if none is attached.
pub fn run(args: ServeArgs, session: &Session) -> CliResult<i32> {
    let heartbeat = args.heartbeat.as_deref().map(parse_duration).transpose()?;
    let listener = args.target.listen()?;

    let stop = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(stop.clone())?;
    info!(listen = %args.target, echo = args.echo, ?heartbeat, "serving");

    let mut counter = 0u32;
    while !stop.load(Ordering::SeqCst) {
        let stream = match listener.accept() {
            Ok(stream) => stream,
            Err(err) => return Err(crate::exit::transport_error("accept failed", err)),
        };

        let mut dispatcher = Dispatcher::with_core();
        if args.echo {
            dispatcher.add(EchoHandler);
        }
        let result = Device::new(stream, dispatcher).and_then(|device| {
            let mut device = device.with_poll_interval(SERVE_POLL);
            device.set_debug(session.config.debug);
            serve_connection(&mut device, heartbeat, &stop, &mut counter)
        });
        if let Err(err) = result {
            warn!(error = %err, "connection ended with an error");
        }

        if args.once {
            break;
        }
    }

    Ok(SUCCESS)
}

fn serve_connection(
    device: &mut Device<ByteStream>,
    heartbeat: Option<Duration>,
    stop: &AtomicBool,
    counter: &mut u32,
) -> duinobus_bus::Result<()> {
    device.log(Severity::Info, "device ready")?;

    let Some(interval) = heartbeat else {
        return device.serve(stop);
    };

    let mut next_beat = Instant::now() + interval;
    while !stop.load(Ordering::SeqCst) {
        let wait = next_beat.saturating_duration_since(Instant::now()).min(SERVE_POLL);
        match device.poll_once(wait) {
            Ok(_) => {}
            Err(BusError::Transport(TransportError::Closed)) => {
                info!("host disconnected");
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        if Instant::now() >= next_beat {
            let mut packer = Packer::new();
            packer.pack_u32(*counter)?;
            device.send_event(packer.into_bytes())?;
            *counter = counter.wrapping_add(1);
            next_beat += interval;
        }
    }
    Ok(())
}
