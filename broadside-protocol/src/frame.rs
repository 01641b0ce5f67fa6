//! Binary frame format.
//!
//! Frame layout (7 bytes header + payload + 1 or 2 bytes checksum):
//!
//! ```text
//! +----------+------+-------------+---------+----------+
//! | sequence | type | payload_len | payload | checksum |
//! | 4 bytes  |1 byte|   2 bytes   |   len   | 1|2 bytes|
//! +----------+------+-------------+---------+----------+
//! ```
//!
//! All integers are big-endian. The checksum is the additive sum of every
//! header and payload byte, modulo 256 (`Sum8`) or modulo 65536 (`Sum16`).

use crate::error::ProtocolError;
use crate::MAX_PAYLOAD_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of the fixed frame header in bytes (4+1+2 = 7).
pub const FRAME_HEADER_SIZE: usize = 7;

/// Width and modulus of the additive checksum trailer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumKind {
    /// One byte, sum modulo 256.
    #[default]
    Sum8,
    /// Two bytes, sum modulo 65536.
    Sum16,
}

impl ChecksumKind {
    /// Number of trailer bytes.
    pub fn width(self) -> usize {
        match self {
            ChecksumKind::Sum8 => 1,
            ChecksumKind::Sum16 => 2,
        }
    }

    /// Computes the checksum over `bytes`.
    pub fn compute(self, bytes: &[u8]) -> u16 {
        let sum = bytes
            .iter()
            .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)));
        match self {
            ChecksumKind::Sum8 => (sum % 256) as u16,
            ChecksumKind::Sum16 => (sum % 65536) as u16,
        }
    }

    fn put(self, buf: &mut BytesMut, value: u16) {
        match self {
            ChecksumKind::Sum8 => buf.put_u8(value as u8),
            ChecksumKind::Sum16 => buf.put_u16(value),
        }
    }

    fn read(self, trailer: &[u8]) -> u16 {
        match self {
            ChecksumKind::Sum8 => u16::from(trailer[0]),
            ChecksumKind::Sum16 => u16::from_be_bytes([trailer[0], trailer[1]]),
        }
    }
}

impl std::str::FromStr for ChecksumKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sum8" | "8" => Ok(ChecksumKind::Sum8),
            "sum16" | "16" => Ok(ChecksumKind::Sum16),
            other => Err(format!("unknown checksum kind '{}'", other)),
        }
    }
}

/// Packet type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Place = 1,
    Fire = 2,
    Result = 3,
    Chat = 4,
    Status = 5,
    Ping = 6,
    Pong = 7,
    Error = 8,
    Quit = 9,
}

impl PacketType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        Ok(match code {
            1 => PacketType::Place,
            2 => PacketType::Fire,
            3 => PacketType::Result,
            4 => PacketType::Chat,
            5 => PacketType::Status,
            6 => PacketType::Ping,
            7 => PacketType::Pong,
            8 => PacketType::Error,
            9 => PacketType::Quit,
            other => return Err(ProtocolError::UnknownPacketType(other)),
        })
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketType::Place => "PLACE",
            PacketType::Fire => "FIRE",
            PacketType::Result => "RESULT",
            PacketType::Chat => "CHAT",
            PacketType::Status => "STATUS",
            PacketType::Ping => "PING",
            PacketType::Pong => "PONG",
            PacketType::Error => "ERROR",
            PacketType::Quit => "QUIT",
        };
        f.write_str(name)
    }
}

/// A parsed packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sender-assigned sequence number.
    pub sequence: u32,
    /// Packet type.
    pub packet_type: PacketType,
    /// Raw payload.
    pub payload: Bytes,
}

impl Packet {
    /// Creates a new packet.
    pub fn new(sequence: u32, packet_type: PacketType, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            packet_type,
            payload: payload.into(),
        }
    }

    /// Creates a packet carrying a JSON-serialized value.
    pub fn from_json<T: Serialize>(
        sequence: u32,
        packet_type: PacketType,
        value: &T,
    ) -> Result<Self, ProtocolError> {
        let payload = serde_json::to_vec(value)?;
        Ok(Self::new(sequence, packet_type, payload))
    }

    /// Returns the payload as UTF-8 text.
    pub fn text(&self) -> Result<&str, ProtocolError> {
        std::str::from_utf8(&self.payload).map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Deserializes the payload as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Total encoded size with the given checksum width.
    pub fn encoded_len(&self, checksum: ChecksumKind) -> usize {
        FRAME_HEADER_SIZE + self.payload.len() + checksum.width()
    }

    /// Encodes the packet into bytes.
    pub fn encode(&self, checksum: ChecksumKind) -> Result<BytesMut, ProtocolError> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(self.encoded_len(checksum));
        buf.put_u32(self.sequence);
        buf.put_u8(self.packet_type.code());
        buf.put_u16(self.payload.len() as u16);
        buf.put_slice(&self.payload);

        let sum = checksum.compute(&buf);
        checksum.put(&mut buf, sum);

        Ok(buf)
    }

    /// Decodes one complete frame held in `bytes`.
    ///
    /// The checksum is verified before any header field is interpreted, so
    /// corruption anywhere in the frame surfaces as `ChecksumMismatch`. A
    /// frame whose checksum is intact but whose declared length disagrees
    /// with the bytes present is `LengthMismatch`.
    pub fn decode_exact(bytes: &[u8], checksum: ChecksumKind) -> Result<Self, ProtocolError> {
        let width = checksum.width();
        if bytes.len() < FRAME_HEADER_SIZE + width {
            return Err(ProtocolError::FrameTooShort { len: bytes.len() });
        }

        let (body, trailer) = bytes.split_at(bytes.len() - width);
        verify(checksum, body, trailer)?;

        let declared = u16::from_be_bytes([body[5], body[6]]) as usize;
        let available = body.len() - FRAME_HEADER_SIZE;
        if declared != available {
            return Err(ProtocolError::LengthMismatch {
                declared,
                available,
            });
        }

        Ok(Self {
            sequence: u32::from_be_bytes([body[0], body[1], body[2], body[3]]),
            packet_type: PacketType::from_code(body[4])?,
            payload: Bytes::copy_from_slice(&body[FRAME_HEADER_SIZE..]),
        })
    }

    /// Decodes the next frame from a stream buffer.
    ///
    /// Returns `Ok(None)` if more data is needed. Once a frame's declared
    /// extent is buffered, the whole extent is consumed and either the packet
    /// or the error is returned; the caller decides how to resynchronize.
    pub fn decode(buf: &mut BytesMut, checksum: ChecksumKind) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let payload_len = u16::from_be_bytes([buf[5], buf[6]]) as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let total_len = FRAME_HEADER_SIZE + payload_len + checksum.width();
        if buf.len() < total_len {
            return Ok(None);
        }

        let frame = buf.split_to(total_len).freeze();
        let (body, trailer) = frame.split_at(total_len - checksum.width());
        verify(checksum, body, trailer)?;

        let mut header = &body[..FRAME_HEADER_SIZE];
        let sequence = header.get_u32();
        let packet_type = PacketType::from_code(header.get_u8())?;

        Ok(Some(Self {
            sequence,
            packet_type,
            payload: frame.slice(FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + payload_len),
        }))
    }
}

fn verify(checksum: ChecksumKind, body: &[u8], trailer: &[u8]) -> Result<(), ProtocolError> {
    let expected = checksum.read(trailer);
    let actual = checksum.compute(body);
    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}
