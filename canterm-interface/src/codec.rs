//! Codec trait seam between the adapter driver and the bus-protocol framers.
//!
//! The adapter driver installs one encoder/decoder pair per negotiated bus
//! protocol; which concrete pair depends on the protocol and on the adapter's
//! on-chip segmentation capabilities.

use crate::error::Result;

/// Turns a complete diagnostic payload into the byte form handed to the
/// adapter's data command.
pub trait PayloadEncoder: Send + Sync {
    /// Largest payload accepted in a single call. This bound doubles as the
    /// transport MTU advertised to session-layer callers.
    fn max_payload(&self) -> usize;

    /// Encode one payload. Implementations reject empty payloads and payloads
    /// above [`PayloadEncoder::max_payload`].
    fn encode(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// Turns the byte-concatenation of adapter reply lines back into a complete
/// diagnostic payload.
pub trait PayloadDecoder: Send + Sync {
    /// Decode one reassembled payload.
    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>>;
}
