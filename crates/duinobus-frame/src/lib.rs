//! SLIP-style packet framing with CRC-8 integrity checking.
//!
//! Every packet travels as:
//! - a 0xC0 start delimiter
//! - the command byte and payload, with 0xC0/0xDB escaped
//! - a CRC-8 (poly 0x07) over command and payload, also escaped
//! - a 0xC0 end delimiter
//!
//! The decoder and encoder work one byte at a time and never touch I/O.

pub mod command;
pub mod crc;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod pack;
pub mod packet;

#[cfg(feature = "async")]
pub mod codec;

pub use command::{command_name, is_async, DEBUG, EVENT, LOG, PING, USER_COMMAND_START};
pub use crc::crc8;
pub use decoder::{DecoderState, PacketDecoder, BUFFER_CAPACITY};
pub use encoder::{encode_packet, write_packet, PacketEncoder};
pub use error::{FrameError, Result, UnpackError};
pub use pack::{Packer, Unpacker};
pub use packet::{Hex, Packet, END, ESC, ESC_END, ESC_ESC, MAX_PAYLOAD};

#[cfg(feature = "async")]
pub use codec::PacketCodec;
