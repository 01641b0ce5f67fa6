//! # broadside-protocol
//!
//! Wire protocol implementation for broadside.
//!
//! This crate provides:
//! - Binary framing with a sequence number, packet type, length prefix and
//!   additive checksum trailer
//! - A streaming decoder for TCP byte streams
//! - Slash-command parsing for chat payloads
//! - Stable error codes returned to clients

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{Decoder, Encoder};
pub use error::{ErrorCode, ProtocolError};
pub use frame::{ChecksumKind, Packet, PacketType, FRAME_HEADER_SIZE};
pub use message::{
    ChatBody, ChatLine, Command, CommandError, ErrorBody, ResultBody, ShotOutcome,
};

/// Default port for the broadside server.
pub const DEFAULT_PORT: u16 = 5001;

/// Maximum frame payload size (4 KiB).
pub const MAX_PAYLOAD_SIZE: usize = 4096;
