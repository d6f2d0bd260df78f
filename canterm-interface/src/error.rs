//! Unified error taxonomy for the transport stack.

use thiserror::Error;

use crate::nrc::NegativeResponseCode;

/// Convenience result alias used across the workspace.
pub type Result<T> = core::result::Result<T, Error>;

/// Every failure the transport stack can surface.
///
/// The taxonomy is deliberately flat: callers at the session layer match on a
/// single enum regardless of whether the failure originated on the wire, in a
/// codec, or in the adapter state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Low-level physical/adapter error reported from the wire.
    #[error("bus error: {0}")]
    Bus(String),
    /// Payload framing failed on the encode side.
    #[error("encoder error: {0}")]
    Encoder(String),
    /// Payload framing failed on the decode side.
    #[error("decoder error: {0}")]
    Decoder(String),
    /// The adapter has terminally departed.
    #[error("adapter disconnected")]
    Disconnected,
    /// Non-ASCII or otherwise unparseable bytes in a response.
    #[error("invalid characters in response")]
    InvalidCharacters,
    /// Higher-layer structural violation.
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    /// The requested operation has no mapping for the current provider.
    #[error("no command mapping for the requested operation")]
    MalformedService,
    /// The reply was empty.
    #[error("no response")]
    NoResponse,
    /// The per-command timer expired.
    #[error("command timed out")]
    Timeout,
    /// The peer answered with a terminal negative response.
    #[error("negative response: {0}")]
    UdsNegativeResponse(NegativeResponseCode),
    /// Type/shape mismatch between command and reply.
    #[error("unexpected result: {0}")]
    UnexpectedResult(String),
    /// The adapter lacks a capability the request needs.
    #[error("adapter is unsuitable for this request")]
    UnsuitableAdapter,
    /// The adapter answered with its `?` token.
    #[error("adapter did not recognize the command")]
    UnrecognizedCommand,
    /// Transport state machine violation.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// Payload below the minimum transfer size.
    #[error("payload is empty")]
    MessageTooSmall,
    /// Payload above the maximum transfer size.
    #[error("payload exceeds the maximum transfer size")]
    MessageTooBig,
    /// The command queue was shut down while the request was pending.
    #[error("command queue shut down")]
    Shutdown,
}
