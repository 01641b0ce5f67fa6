//! Stream encoder and decoder.

use crate::error::ProtocolError;
use crate::frame::{ChecksumKind, Packet, PacketType};
use bytes::{Bytes, BytesMut};

/// Encodes outgoing packets, assigning each a monotonic sequence number.
#[derive(Debug)]
pub struct Encoder {
    checksum: ChecksumKind,
    next_sequence: u32,
}

impl Encoder {
    pub fn new(checksum: ChecksumKind) -> Self {
        Self {
            checksum,
            next_sequence: 1,
        }
    }

    /// Sequence number the next encoded packet will carry.
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Encodes a packet of `packet_type` carrying `payload`.
    pub fn encode(
        &mut self,
        packet_type: PacketType,
        payload: impl Into<Bytes>,
    ) -> Result<BytesMut, ProtocolError> {
        let packet = Packet::new(self.next_sequence, packet_type, payload);
        let encoded = packet.encode(self.checksum)?;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        Ok(encoded)
    }

    /// Encodes any JSON-serializable value.
    pub fn encode_json<T: serde::Serialize>(
        &mut self,
        packet_type: PacketType,
        value: &T,
    ) -> Result<BytesMut, ProtocolError> {
        let payload = serde_json::to_vec(value)?;
        self.encode(packet_type, payload)
    }
}

/// Decodes packets from a byte stream.
#[derive(Debug)]
pub struct Decoder {
    checksum: ChecksumKind,
    buffer: BytesMut,
}

impl Decoder {
    pub fn new(checksum: ChecksumKind) -> Self {
        Self {
            checksum,
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next packet from the buffer.
    pub fn decode_packet(&mut self) -> Result<Option<Packet>, ProtocolError> {
        Packet::decode(&mut self.buffer, self.checksum)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(ChecksumKind::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_assigns_monotonic_sequence() {
        let mut encoder = Encoder::new(ChecksumKind::Sum8);
        let mut decoder = Decoder::new(ChecksumKind::Sum8);

        for _ in 0..3 {
            let bytes = encoder.encode(PacketType::Ping, "x").unwrap();
            decoder.extend(&bytes);
        }

        let seqs: Vec<u32> = std::iter::from_fn(|| decoder.decode_packet().unwrap())
            .map(|p| p.sequence)
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(encoder.next_sequence(), 4);
    }

    #[test]
    fn test_partial_frame_decoding() {
        let mut encoder = Encoder::new(ChecksumKind::Sum16);
        let encoded = encoder.encode(PacketType::Place, "C3 V").unwrap();

        let mut decoder = Decoder::new(ChecksumKind::Sum16);
        decoder.extend(&encoded[..4]);
        assert!(decoder.decode_packet().unwrap().is_none());

        decoder.extend(&encoded[4..]);
        let decoded = decoder.decode_packet().unwrap().unwrap();
        assert_eq!(decoded.text().unwrap(), "C3 V");
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decoder_recovers_after_corrupt_frame() {
        let mut encoder = Encoder::new(ChecksumKind::Sum8);
        let mut bad = encoder.encode(PacketType::Chat, "hello").unwrap();
        let last = bad.len() - 1;
        bad[last] = bad[last].wrapping_add(1);
        let good = encoder.encode(PacketType::Chat, "world").unwrap();

        let mut decoder = Decoder::new(ChecksumKind::Sum8);
        decoder.extend(&bad);
        decoder.extend(&good);

        assert!(matches!(
            decoder.decode_packet(),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
        let next = decoder.decode_packet().unwrap().unwrap();
        assert_eq!(next.text().unwrap(), "world");
    }

    #[test]
    fn test_encode_json() {
        let mut encoder = Encoder::new(ChecksumKind::Sum8);
        let bytes = encoder
            .encode_json(PacketType::Status, &serde_json::json!({"type": "queue", "position": 2}))
            .unwrap();

        let mut decoder = Decoder::default();
        decoder.extend(&bytes);
        let packet = decoder.decode_packet().unwrap().unwrap();
        let value: serde_json::Value = packet.json().unwrap();
        assert_eq!(value["position"], 2);
    }

    #[test]
    fn test_decoder_buffered() {
        let mut decoder = Decoder::default();
        assert_eq!(decoder.buffered(), 0);

        decoder.extend(b"some");
        assert_eq!(decoder.buffered(), 4);

        decoder.clear();
        assert_eq!(decoder.buffered(), 0);
    }
}
