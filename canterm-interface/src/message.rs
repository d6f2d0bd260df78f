//! Addressed diagnostic payloads.

use crate::header::Header;

/// A single addressed diagnostic payload.
///
/// Direction is interpreted by context: on the way out, `id` is the
/// destination and `reply` names the expected replier; on the way in, `id` is
/// the source and `reply` carries the correlator (the header the request was
/// sent to).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Destination (outbound) or source (inbound) identifier.
    pub id: Header,
    /// Expected replier (outbound) or correlator (inbound).
    pub reply: Header,
    /// Service payload bytes. Non-empty for every real request/response.
    pub bytes: Vec<u8>,
}

impl Message {
    /// Build a fully addressed message.
    pub fn new(id: Header, reply: Header, bytes: Vec<u8>) -> Self {
        Self { id, reply, bytes }
    }

    /// Build a broadcast-style request without a pinned replier.
    pub fn request(id: Header, bytes: Vec<u8>) -> Self {
        Self::new(id, Header::UNSET, bytes)
    }

    /// Derive a sibling carrying different payload bytes.
    pub fn with_bytes(&self, bytes: Vec<u8>) -> Self {
        Self {
            id: self.id,
            reply: self.reply,
            bytes,
        }
    }

    /// Derive a sibling with a different expected replier.
    pub fn with_reply(&self, reply: Header) -> Self {
        Self {
            id: self.id,
            reply,
            bytes: self.bytes.clone(),
        }
    }

    /// The UDS service identifier, i.e. the first payload byte.
    pub fn service_id(&self) -> Option<u8> {
        self.bytes.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_derivations_keep_addressing() {
        let msg = Message::new(Header::new(0x7E0), Header::new(0x7E8), vec![0x22, 0xF1, 0x90]);
        let sibling = msg.with_bytes(vec![0x62]);
        assert_eq!(sibling.id, msg.id);
        assert_eq!(sibling.reply, msg.reply);
        assert_eq!(sibling.bytes, vec![0x62]);

        let rerouted = msg.with_reply(Header::new(0x7EA));
        assert_eq!(rerouted.bytes, msg.bytes);
        assert_eq!(rerouted.reply, Header::new(0x7EA));
    }

    #[test]
    fn service_id_is_first_byte() {
        let msg = Message::request(Header::new(0x7DF), vec![0x09, 0x02]);
        assert_eq!(msg.service_id(), Some(0x09));
        assert_eq!(
            Message::request(Header::UNSET, Vec::new()).service_id(),
            None
        );
    }
}
