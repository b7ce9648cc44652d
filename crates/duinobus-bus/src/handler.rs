//! Device-side command handling.

use duinobus_frame::{command_name, Packer, Packet, DEBUG, PING};
use tracing::{debug, error, warn};

/// Bit in the `DEBUG` flags word that enables packet dumps.
pub const DEBUG_PACKETS: u32 = 0x01;

/// State handlers may change while servicing a command.
#[derive(Debug, Clone, Default)]
pub struct HandlerContext {
    /// Dump packets sent and received.
    pub debug: bool,
}

/// Services a subset of commands.
pub trait PacketHandler: Send {
    /// Handle `packet`, returning the response, or `None` to let the next
    /// handler try.
    fn handle(&mut self, packet: &Packet, ctx: &mut HandlerContext) -> Option<Packet>;

    /// Human-readable name for a command this handler owns.
    fn command_name(&self, _command: u8) -> Option<&'static str> {
        None
    }
}

/// Handles the built-in `PING` and `DEBUG` commands.
#[derive(Debug, Default)]
pub struct CorePacketHandler;

impl PacketHandler for CorePacketHandler {
    fn handle(&mut self, packet: &Packet, ctx: &mut HandlerContext) -> Option<Packet> {
        match packet.command {
            PING => Some(Packet::new(PING, packet.payload.clone())),
            DEBUG => {
                let flags = match packet.unpacker().unpack_u32() {
                    Ok(flags) => flags,
                    Err(err) => {
                        warn!(error = %err, "DEBUG command without a flags word");
                        0
                    }
                };
                ctx.debug = flags & DEBUG_PACKETS != 0;
                debug!(flags, debug = ctx.debug, "debug flags updated");

                let mut packer = Packer::new();
                packer.pack_u32(flags).ok()?;
                Some(packer.into_packet(DEBUG))
            }
            _ => None,
        }
    }

    fn command_name(&self, command: u8) -> Option<&'static str> {
        match command {
            PING | DEBUG => Some(command_name(command)),
            _ => None,
        }
    }
}

/// Routes each packet to the first handler that claims it.
#[derive(Default)]
pub struct Dispatcher {
    handlers: Vec<Box<dyn PacketHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher with [`CorePacketHandler`] installed.
    pub fn with_core() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.add(CorePacketHandler);
        dispatcher
    }

    /// Append a handler. Earlier handlers take precedence.
    pub fn add(&mut self, handler: impl PacketHandler + 'static) -> &mut Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Name of `command`, asking the handlers before falling back to the
    /// reserved-command table.
    pub fn command_name(&self, command: u8) -> &'static str {
        self.handlers
            .iter()
            .find_map(|handler| handler.command_name(command))
            .unwrap_or_else(|| command_name(command))
    }

    /// Hand `packet` to the handlers in order.
    ///
    /// Returns the response of the first handler that accepts it. Packets no
    /// handler accepts are logged and produce no response.
    pub fn dispatch(&mut self, packet: &Packet, ctx: &mut HandlerContext) -> Option<Packet> {
        for handler in &mut self.handlers {
            if let Some(response) = handler.handle(packet, ctx) {
                return Some(response);
            }
        }
        error!(
            command = format_args!("0x{:02x}", packet.command),
            name = self.command_name(packet.command),
            "unhandled command"
        );
        None
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
