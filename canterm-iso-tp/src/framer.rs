//! Stateless ISO-TP block framer.
//!
//! Some adapters move a whole transfer at once: the host hands over (or
//! receives) the flat byte-concatenation of all frames, and nobody exchanges
//! flow control on the wire. These encoders/decoders translate between a
//! complete payload and that concatenated form.

use canterm_interface::{Error, PayloadDecoder, PayloadEncoder, Result};

use crate::pdu::{FrameType, MAX_PAYLOAD};

/// Encode a payload into the concatenation of its ISO-TP frames.
///
/// Payloads of up to 7 bytes become one unpadded Single Frame. Larger
/// payloads become a First Frame (6 payload bytes) followed by Consecutive
/// Frames of up to 7 bytes each, sequence numbers wrapping `0x2F -> 0x20`.
pub fn encode_payload(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.is_empty() {
        return Err(Error::MessageTooSmall);
    }
    if payload.len() > MAX_PAYLOAD {
        return Err(Error::MessageTooBig);
    }

    if payload.len() <= 7 {
        let mut out = Vec::with_capacity(payload.len() + 1);
        out.push(payload.len() as u8);
        out.extend_from_slice(payload);
        return Ok(out);
    }

    let mut out = Vec::with_capacity(payload.len() + payload.len() / 7 + 2);
    out.push(0x10 | ((payload.len() >> 8) as u8));
    out.push((payload.len() & 0xFF) as u8);
    out.extend_from_slice(&payload[..6]);

    let mut sequence_number = 1u8;
    for chunk in payload[6..].chunks(7) {
        out.push(0x20 | sequence_number);
        out.extend_from_slice(chunk);
        sequence_number = (sequence_number + 1) & 0x0F;
    }
    Ok(out)
}

/// Decode the concatenation of ISO-TP frames back into a payload.
///
/// Buffers shorter than 9 bytes are treated as a lone Single Frame; a leading
/// `0x30` passes through unchanged (a flow-control acknowledgement reported by
/// the adapter). Anything longer must start with a First Frame and continue
/// with in-sequence Consecutive Frames.
pub fn decode_payload(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.is_empty() {
        return Err(Error::Decoder("empty input".into()));
    }

    if bytes.len() < 9 {
        if bytes[0] == 0x30 {
            return Ok(bytes.to_vec());
        }
        let data_length = bytes[0] as usize;
        if !(1..=7).contains(&data_length) {
            return Err(Error::Decoder(format!(
                "invalid single frame PCI 0x{:02X}",
                bytes[0]
            )));
        }
        if bytes.len() <= data_length {
            return Err(Error::Decoder(format!(
                "single frame truncated: {} bytes announced, {} present",
                data_length,
                bytes.len() - 1
            )));
        }
        return Ok(bytes[1..=data_length].to_vec());
    }

    if FrameType::from_pci(bytes[0]) != Some(FrameType::First) {
        return Err(Error::Decoder(format!(
            "expected first frame, got PCI 0x{:02X}",
            bytes[0]
        )));
    }
    let total = (((bytes[0] & 0x0F) as usize) << 8) | bytes[1] as usize;
    if total <= 7 {
        return Err(Error::Decoder(format!(
            "first frame length {total} below single frame threshold"
        )));
    }

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&bytes[2..8]);
    let mut remaining = total - 6;
    let mut index = 8;
    let mut sequence_number = 1u8;

    while remaining > 0 {
        if index >= bytes.len() {
            return Err(Error::Decoder(format!(
                "input underflow: {remaining} payload bytes missing"
            )));
        }
        let expected = 0x20 | sequence_number;
        if bytes[index] != expected {
            return Err(Error::Decoder(format!(
                "unexpected PCI 0x{:02X}, expected 0x{expected:02X}",
                bytes[index]
            )));
        }
        let available = bytes.len() - index - 1;
        let take = remaining.min(7).min(available);
        if take == 0 {
            return Err(Error::Decoder(
                "consecutive frame carries no payload bytes".into(),
            ));
        }
        out.extend_from_slice(&bytes[index + 1..index + 1 + take]);
        remaining -= take;
        index += 1 + take;
        sequence_number = (sequence_number + 1) & 0x0F;
    }

    debug_assert_eq!(out.len(), total);
    Ok(out)
}

/// [`PayloadEncoder`] over [`encode_payload`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IsoTpEncoder;

impl PayloadEncoder for IsoTpEncoder {
    fn max_payload(&self) -> usize {
        MAX_PAYLOAD
    }

    fn encode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        encode_payload(payload)
    }
}

/// [`PayloadDecoder`] over [`decode_payload`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IsoTpDecoder;

impl PayloadDecoder for IsoTpDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        decode_payload(bytes)
    }
}
