//! Payload codecs for the non-ISO-TP bus protocols.
//!
//! Adapters that segment on-chip — and every non-CAN protocol — need no host
//! side framing: the encoder side is a bounds-checked pass-through, and the
//! decoder side at most strips the line structure the adapter reports.

use canterm_interface::{Error, PayloadDecoder, PayloadEncoder, Result};

/// Pass-through encoder that only enforces a payload bound.
///
/// The bound is the adapter's transmit capability: 7 bytes for CAN with
/// auto-formatting, 8 for raw CAN frames, or the much larger on-chip
/// segmentation limits of STN-class ICs.
#[derive(Debug, Clone, Copy)]
pub struct NullEncoder {
    max_payload: usize,
}

impl NullEncoder {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl PayloadEncoder for NullEncoder {
    fn max_payload(&self) -> usize {
        self.max_payload
    }

    fn encode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.is_empty() {
            return Err(Error::MessageTooSmall);
        }
        if payload.len() > self.max_payload {
            return Err(Error::MessageTooBig);
        }
        Ok(payload.to_vec())
    }
}

/// Identity decoder for adapters that deliver complete payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDecoder;

impl PayloadDecoder for NullDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// SAE J1850 reply decoder.
///
/// The adapter already strips the checksum; what remains is the payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct J1850Decoder;

impl PayloadDecoder for J1850Decoder {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        if bytes.is_empty() {
            return Err(Error::Decoder("empty J1850 response".into()));
        }
        Ok(bytes.to_vec())
    }
}

/// KWP 2000 reply decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Kwp2000Decoder;

impl PayloadDecoder for Kwp2000Decoder {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        if bytes.is_empty() {
            return Err(Error::Decoder("empty KWP 2000 response".into()));
        }
        Ok(bytes.to_vec())
    }
}

/// ISO 9141-2 reply decoder.
///
/// Replies arrive as 8-byte chunks whose third byte is a 1-based chunk
/// sequence number. The first chunk contributes its leading two bytes, and
/// every chunk contributes the four payload bytes following the sequence
/// number.
#[derive(Debug, Clone, Copy, Default)]
pub struct Iso9141Decoder;

impl PayloadDecoder for Iso9141Decoder {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        if bytes.is_empty() {
            return Err(Error::Decoder("empty ISO 9141 response".into()));
        }

        let mut out = Vec::with_capacity(bytes.len());
        for (index, chunk) in bytes.chunks(8).enumerate() {
            let sequence = (index + 1) as u8;
            if chunk.len() < 3 {
                return Err(Error::Decoder(format!(
                    "ISO 9141 chunk {sequence} truncated to {} bytes",
                    chunk.len()
                )));
            }
            if chunk[2] != sequence {
                return Err(Error::Decoder(format!(
                    "ISO 9141 sequence mismatch: expected {sequence}, got {}",
                    chunk[2]
                )));
            }
            if index == 0 {
                out.extend_from_slice(&chunk[..2]);
            }
            out.extend_from_slice(&chunk[3..chunk.len().min(7)]);
        }
        Ok(out)
    }
}
