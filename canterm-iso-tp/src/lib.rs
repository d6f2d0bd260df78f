//! `canterm-iso-tp`: ISO-TP (ISO 15765-2) segmentation for diagnostic payloads.
//!
//! ISO-TP carries payloads of up to 4095 bytes over fixed 8-byte CAN frames by
//! segmenting messages into:
//! - a **Single Frame** (small payloads),
//! - a **First Frame** + multiple **Consecutive Frames** (larger payloads), and
//! - **Flow Control** frames to regulate pacing and batching.
//!
//! This crate provides two independent renditions of that protocol:
//! - [`framer`]: stateless block encode/decode between a payload and the flat
//!   byte-concatenation of its frames, for adapters that move whole transfers
//!   at once.
//! - [`Transceiver`]: a sans-IO bidirectional state machine for adapters that
//!   move one 8-byte frame at a time. Callers feed received frames in through
//!   [`Transceiver::did_read`] and carry out the returned [`Action`]s; the
//!   machine never touches a wire itself.
//!
//! Supporting building blocks (PCI constants, flow-control frames, STmin
//! helpers) live in [`pdu`].

pub mod framer;
pub mod pdu;
pub mod transceiver;

pub use framer::{decode_payload, encode_payload, IsoTpDecoder, IsoTpEncoder};
pub use pdu::{FlowControlFrame, FlowStatus, FrameType, FRAME_LEN, MAX_FRAMES, MAX_PAYLOAD};
pub use transceiver::{Action, Behavior, Transceiver, TransceiverConfig, TransceiverState};
