//! `canterm`: UDS transport over ELM327/STN-class serial adapters.
//!
//! The crate turns an opaque duplex byte stream — typically a serial port or
//! TCP/Bluetooth bridge to a low-cost "ELM327-class" adapter — into a
//! byte-accurate UDS message transport:
//!
//! - [`StreamCommandQueue`]: a single-in-flight request/response queue over
//!   the byte stream, with prompt-based response framing and per-command
//!   timeouts.
//! - [`AdapterCommand`]: the catalogue of adapter operations and their ASCII
//!   wire forms plus response parsers.
//! - [`Adapter`]: the driver proper — identifies the adapter IC, negotiates
//!   the bus protocol, installs the right payload codecs, and moves UDS
//!   messages.
//! - [`UdsPipeline`]: serializes concurrent callers onto one adapter.
//!
//! Segmentation lives in [`canterm_iso_tp`]; the shared data model (headers,
//! messages, bus protocols, errors) lives in [`canterm_interface`] and is
//! re-exported here.
//!
//! ```rust,ignore
//! use canterm::{Adapter, BusProtocol, Header, StreamCommandQueue, UdsPipeline};
//!
//! # async fn example(port: tokio_serial::SerialStream) -> canterm::Result<()> {
//! let (reader, writer) = tokio::io::split(port);
//! let queue = StreamCommandQueue::spawn(reader, writer);
//! let mut adapter = Adapter::new(queue);
//! adapter.connect(BusProtocol::Can11Bit500k).await?;
//!
//! let pipeline = UdsPipeline::new(adapter);
//! let response = pipeline
//!     .send(Header::new(0x7E0), Header::new(0x7E8), &[0x22, 0xF1, 0x90])
//!     .await?;
//! println!("VIN record: {:02X?}", response.bytes);
//! # Ok(()) }
//! ```

pub mod adapter;
pub mod codec;
pub mod command;
pub mod pipeline;
pub mod queue;

pub use adapter::{Adapter, AdapterInfo, AdapterState, Chip};
pub use canterm_interface::{
    BusProtocol, Error, Header, Message, NegativeResponseCode, PayloadDecoder, PayloadEncoder,
    Result,
};
pub use codec::{Iso9141Decoder, J1850Decoder, Kwp2000Decoder, NullDecoder, NullEncoder};
pub use command::{AdapterCommand, CommandResponse};
pub use pipeline::UdsPipeline;
pub use queue::{QueueConfig, StreamCommandQueue};
