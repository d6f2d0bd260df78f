//! `canterm-interface`: shared data model for the `canterm` UDS transport stack.
//!
//! This crate defines the dependency-light vocabulary spoken by every other
//! crate in the workspace:
//! - [`Header`]: a raw 32-bit CAN identifier with 11-bit/29-bit classification,
//! - [`Message`]: an addressed diagnostic payload,
//! - [`BusProtocol`]: the negotiated vehicle bus protocol tag,
//! - [`NegativeResponseCode`]: the ISO 14229 negative-response vocabulary,
//! - [`Error`]: the unified error taxonomy, and
//! - [`PayloadEncoder`] / [`PayloadDecoder`]: the codec seam the adapter driver
//!   installs per negotiated bus protocol.
//!
//! It intentionally contains no I/O and no protocol state machines.

pub mod codec;
pub mod error;
pub mod header;
pub mod message;
pub mod nrc;
pub mod protocol;

pub use codec::{PayloadDecoder, PayloadEncoder};
pub use error::{Error, Result};
pub use header::Header;
pub use message::Message;
pub use nrc::NegativeResponseCode;
pub use protocol::BusProtocol;
