//! Serial adapter driver.
//!
//! Owns the stream command queue, identifies the adapter IC, negotiates the
//! vehicle bus protocol, installs the matching payload codecs and moves UDS
//! messages through the adapter's data command.

use std::time::Duration;

use canterm_interface::{
    BusProtocol, Error, Header, Message, NegativeResponseCode, PayloadDecoder, PayloadEncoder,
    Result,
};
use canterm_iso_tp::IsoTpDecoder;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::codec::{Iso9141Decoder, J1850Decoder, Kwp2000Decoder, NullDecoder, NullEncoder};
use crate::command::{AdapterCommand, CommandResponse};
use crate::queue::StreamCommandQueue;

const WAKE_TIMEOUT: Duration = Duration::from_millis(300);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);
const DATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Identified adapter IC family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Chip {
    #[default]
    Unknown,
    Elm327,
    Stn11xx,
    Stn22xx,
    UniCarScan,
}

impl Chip {
    /// STN chips speak the `ST` command set (`STPX`, `STCSEG…`).
    pub fn is_stn(self) -> bool {
        matches!(self, Chip::Stn11xx | Chip::Stn22xx)
    }

    /// Largest payload the IC can segment on-chip in one transmission.
    fn auto_segmentation_limit(self) -> usize {
        match self {
            Chip::Stn22xx => 0xFFF,
            Chip::UniCarScan => 0xFF,
            _ => 0x7FF,
        }
    }
}

/// What the init sequence learned about the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdapterInfo {
    pub vendor: String,
    pub version: String,
    pub chip: Chip,
    pub name: Option<String>,
    pub serial: Option<String>,
}

/// Externally observable driver state.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterState {
    Created,
    Searching,
    NotFound,
    Configuring(AdapterInfo),
    UnsupportedProtocol,
    Connected {
        protocol: BusProtocol,
        detected: Vec<Message>,
    },
    Gone,
}

/// Driver for one ELM327/STN-class adapter.
///
/// The driver is single-consumer: one logical caller at a time may run
/// [`Adapter::connect`] / [`Adapter::send_uds`]. Wrap it in a
/// [`crate::UdsPipeline`] to serialize concurrent callers.
pub struct Adapter {
    queue: StreamCommandQueue,
    state: watch::Sender<AdapterState>,
    info: AdapterInfo,
    protocol: BusProtocol,
    encoder: Box<dyn PayloadEncoder>,
    decoder: Box<dyn PayloadDecoder>,
    can_auto_format: bool,
    tx_auto_segmentation: bool,
    rx_auto_segmentation: bool,
    current_header: Header,
    current_arbitration: Header,
}

impl Adapter {
    /// Wrap a spawned command queue.
    pub fn new(queue: StreamCommandQueue) -> Self {
        let (state, _) = watch::channel(AdapterState::Created);
        Self {
            queue,
            state,
            info: AdapterInfo::default(),
            protocol: BusProtocol::Unknown,
            encoder: Box::new(NullEncoder::new(7)),
            decoder: Box::new(NullDecoder),
            can_auto_format: false,
            tx_auto_segmentation: false,
            rx_auto_segmentation: false,
            current_header: Header::UNSET,
            current_arbitration: Header::UNSET,
        }
    }

    /// Watch driver state transitions.
    pub fn subscribe(&self) -> watch::Receiver<AdapterState> {
        self.state.subscribe()
    }

    /// Current driver state.
    pub fn state(&self) -> AdapterState {
        self.state.borrow().clone()
    }

    /// Identification gathered during init.
    pub fn info(&self) -> &AdapterInfo {
        &self.info
    }

    /// Negotiated bus protocol.
    pub fn protocol(&self) -> BusProtocol {
        self.protocol
    }

    /// Largest UDS payload the installed encoder accepts.
    pub fn mtu(&self) -> usize {
        self.encoder.max_payload()
    }

    /// Initialize the adapter and bring up the desired bus protocol.
    pub async fn connect(&mut self, desired: BusProtocol) -> Result<()> {
        self.initialize().await?;
        self.negotiate(desired).await
    }

    /// Initialize the adapter, then probe candidate protocols with the given
    /// test messages. The first test that yields replies selects the
    /// protocol; with `test_all` the remaining tests still run and their
    /// replies are collected into the connected state.
    pub async fn search(
        &mut self,
        protocols: &[BusProtocol],
        tests: &[Message],
        test_all: bool,
    ) -> Result<()> {
        self.initialize().await?;
        if tests.is_empty() {
            let desired = protocols
                .first()
                .copied()
                .unwrap_or(BusProtocol::Auto);
            return self.negotiate(desired).await;
        }

        let mut found = None;
        let mut detected = Vec::new();
        'candidates: for candidate in protocols {
            if !candidate.is_valid() {
                continue;
            }
            if self
                .command(&AdapterCommand::TryProtocol(*candidate), COMMAND_TIMEOUT)
                .await
                .is_err()
            {
                continue;
            }
            // Reply lines of this candidate carry its header width.
            self.protocol = *candidate;
            for test in tests {
                let (set_header, cache_key) = if test.id.is_set() {
                    (AdapterCommand::SetHeader(test.id), test.id)
                } else {
                    let broadcast = candidate.broadcast_header();
                    (
                        AdapterCommand::SetRawHeader(broadcast.to_owned()),
                        Header::from_hex(broadcast)?,
                    )
                };
                if self.command(&set_header, COMMAND_TIMEOUT).await.is_err() {
                    continue 'candidates;
                }
                self.current_header = cache_key;
                let data = AdapterCommand::Data {
                    bytes: test.bytes.clone(),
                    expected_responses: None,
                };
                if let Ok(CommandResponse::Messages(messages)) =
                    self.command(&data, DATA_TIMEOUT).await
                {
                    debug!(protocol = %candidate, replies = messages.len(), "test message answered");
                    detected.extend(messages);
                    found = Some(*candidate);
                    if !test_all {
                        break 'candidates;
                    }
                }
            }
            if found.is_some() {
                break;
            }
        }

        match found {
            Some(protocol) => self.finish_configuration(protocol, detected).await,
            None => {
                self.protocol = BusProtocol::Unknown;
                self.set_state(AdapterState::UnsupportedProtocol);
                Err(Error::UnsuitableAdapter)
            }
        }
    }

    /// Send one UDS request and reassemble the reply.
    pub async fn send_uds(&mut self, message: &Message) -> Result<Message> {
        if !matches!(self.state(), AdapterState::Connected { .. }) {
            return Err(Error::Disconnected);
        }
        if message.bytes.is_empty() {
            return Err(Error::MessageTooSmall);
        }

        self.ensure_headers(message).await?;
        let encoded = self.encoder.encode(&message.bytes)?;

        if encoded.len() > 8 && self.info.chip.is_stn() {
            // STN chips want the length announced up front for long transmits.
            self.command(
                &AdapterCommand::StnTransmitAnnounce {
                    header: message.id,
                    reply: message.reply,
                    length: encoded.len(),
                },
                COMMAND_TIMEOUT,
            )
            .await?;
        }
        let response = self
            .command(
                &AdapterCommand::Data {
                    bytes: encoded,
                    expected_responses: None,
                },
                DATA_TIMEOUT,
            )
            .await?;
        let CommandResponse::Messages(replies) = response else {
            return Err(Error::UnexpectedResult("data command reply shape".into()));
        };

        let sid = message.bytes[0];
        // Without on-chip reassembly each line still leads with its ISO-TP
        // PCI byte, shifting the negative-response pattern by one.
        let pending_offset = usize::from(!self.rx_auto_segmentation);

        let mut assembled = Vec::new();
        let mut source = Header::UNSET;
        for reply in replies {
            if message.reply.is_set() && reply.id != message.reply {
                trace!(source = %reply.id, "dropping reply from unrelated header");
                continue;
            }
            if is_transient_pending(&reply.bytes, sid, pending_offset) {
                trace!(source = %reply.id, "dropping response-pending frame");
                continue;
            }
            source = reply.id;
            assembled.extend_from_slice(&reply.bytes);
        }
        if assembled.is_empty() {
            return Err(Error::NoResponse);
        }

        let decoded = self.decoder.decode(&assembled)?;
        if decoded.len() >= 3 && decoded[0] == 0x7F && decoded[1] == sid {
            if let Some(nrc) = NegativeResponseCode::from_byte(decoded[2]) {
                if !nrc.is_response_pending() {
                    return Err(Error::UdsNegativeResponse(nrc));
                }
            }
        }
        Ok(Message::new(source, message.id, decoded))
    }

    /// Read the adapter's battery voltage report.
    pub async fn read_voltage(&mut self) -> Result<f32> {
        match self
            .command(&AdapterCommand::ReadVoltage, COMMAND_TIMEOUT)
            .await?
        {
            CommandResponse::Voltage(volts) => Ok(volts),
            other => Err(Error::UnexpectedResult(format!("{other:?}"))),
        }
    }

    /// Tear down the queue and mark the adapter gone.
    pub async fn shutdown(&mut self) {
        self.queue.shutdown().await;
        self.set_state(AdapterState::Gone);
    }

    async fn command(
        &self,
        command: &AdapterCommand,
        timeout: Duration,
    ) -> Result<CommandResponse> {
        let raw = self
            .queue
            .send_expecting(&command.wire(), command.termination_override(), timeout)
            .await?;
        command.parse(&raw, self.protocol.header_chars())
    }

    async fn initialize(&mut self) -> Result<()> {
        self.set_state(AdapterState::Searching);
        // The first characters after power-up are regularly lost; wake the
        // adapter and tolerate silence.
        let wake = AdapterCommand::Wake.wire();
        let _ = self.queue.send(&wake, WAKE_TIMEOUT).await;
        let _ = self.queue.send(&wake, WAKE_TIMEOUT).await;

        match self.identify().await {
            Ok(info) => {
                debug!(
                    vendor = info.vendor.as_str(),
                    version = info.version.as_str(),
                    chip = ?info.chip,
                    "adapter identified"
                );
                self.info = info.clone();
                self.set_state(AdapterState::Configuring(info));
                Ok(())
            }
            Err(err) => {
                self.set_state(AdapterState::NotFound);
                Err(err)
            }
        }
    }

    async fn identify(&mut self) -> Result<AdapterInfo> {
        self.command(&AdapterCommand::Reset, COMMAND_TIMEOUT).await?;
        self.command(&AdapterCommand::Spaces(false), COMMAND_TIMEOUT)
            .await?;
        self.command(&AdapterCommand::Echo(false), COMMAND_TIMEOUT)
            .await?;
        self.command(&AdapterCommand::Linefeed(false), COMMAND_TIMEOUT)
            .await?;
        self.command(&AdapterCommand::ShowHeaders(true), COMMAND_TIMEOUT)
            .await?;

        let mut info = AdapterInfo::default();
        if let CommandResponse::Text(text) =
            self.command(&AdapterCommand::Identify, COMMAND_TIMEOUT).await?
        {
            let mut parts = text.split_whitespace();
            info.vendor = parts.next().unwrap_or_default().to_owned();
            info.version = parts.collect::<Vec<_>>().join(" ");
            if info.vendor.starts_with("ELM327") {
                info.chip = Chip::Elm327;
            }
        }
        if let Ok(CommandResponse::Text(text)) = self
            .command(&AdapterCommand::DeviceDescription, COMMAND_TIMEOUT)
            .await
        {
            info.version = text.lines().next().unwrap_or_default().to_owned();
        }
        if let Ok(CommandResponse::Text(text)) = self
            .command(&AdapterCommand::StnExtendedIdentify, COMMAND_TIMEOUT)
            .await
        {
            if text.contains("STN11") {
                info.chip = Chip::Stn11xx;
            } else if text.contains("STN22") {
                info.chip = Chip::Stn22xx;
            }
            let mut lines = text.lines();
            info.name = lines.next().map(str::to_owned);
            info.serial = lines.next().map(str::to_owned);
        }
        if let Ok(CommandResponse::Text(text)) = self
            .command(&AdapterCommand::UniCarScanIdentify, COMMAND_TIMEOUT)
            .await
        {
            if text.contains("WGSoft.de") {
                info.chip = Chip::UniCarScan;
            }
        }
        Ok(info)
    }

    async fn negotiate(&mut self, desired: BusProtocol) -> Result<()> {
        self.command(&AdapterCommand::SetProtocol(desired), COMMAND_TIMEOUT)
            .await?;
        // The probe forces the adapter to actually open the bus; its outcome
        // is informative only.
        let probe_lines = match self
            .command(&AdapterCommand::ConnectProbe, DATA_TIMEOUT)
            .await
        {
            Ok(CommandResponse::Lines(lines)) => lines,
            _ => Vec::new(),
        };

        let negotiated = match self
            .command(&AdapterCommand::DescribeProtocolNumeric, COMMAND_TIMEOUT)
            .await?
        {
            CommandResponse::Protocol(protocol) if protocol.is_valid() => protocol,
            _ => {
                self.set_state(AdapterState::UnsupportedProtocol);
                return Err(Error::UnsuitableAdapter);
            }
        };

        let detected = lenient_messages(&probe_lines, negotiated.header_chars());
        self.finish_configuration(negotiated, detected).await
    }

    async fn finish_configuration(
        &mut self,
        protocol: BusProtocol,
        detected: Vec<Message>,
    ) -> Result<()> {
        if protocol.is_can() {
            let _ = self
                .command(&AdapterCommand::AdaptiveTiming(false), COMMAND_TIMEOUT)
                .await;
            let _ = self
                .command(&AdapterCommand::SetTimeout(0xFF), COMMAND_TIMEOUT)
                .await;
            self.can_auto_format = self
                .command(&AdapterCommand::CanAutoFormat(true), COMMAND_TIMEOUT)
                .await
                .is_ok();
            if self.info.chip.is_stn() {
                self.tx_auto_segmentation = self
                    .command(&AdapterCommand::StnTxSegmentation(true), COMMAND_TIMEOUT)
                    .await
                    .is_ok();
                self.rx_auto_segmentation = self
                    .command(&AdapterCommand::StnRxSegmentation(true), COMMAND_TIMEOUT)
                    .await
                    .is_ok();
            } else {
                self.probe_segmentation().await;
            }
        }

        self.install_codecs(protocol);
        self.protocol = protocol;
        debug!(
            %protocol,
            mtu = self.encoder.max_payload(),
            tx_auto = self.tx_auto_segmentation,
            rx_auto = self.rx_auto_segmentation,
            "adapter configured"
        );
        self.set_state(AdapterState::Connected { protocol, detected });
        Ok(())
    }

    /// Capability discovery for ICs without an explicit segmentation switch:
    /// a data line longer than one CAN frame is rejected with `?` by plain
    /// ELM clones but accepted by ICs that segment on-chip.
    async fn probe_segmentation(&mut self) {
        let long_probe = AdapterCommand::Data {
            bytes: vec![0x00; 12],
            expected_responses: Some(0),
        };
        let supported = match self.queue.send(&long_probe.wire(), COMMAND_TIMEOUT).await {
            Ok(text) => !text.contains('?'),
            Err(_) => false,
        };
        self.tx_auto_segmentation = supported;
        self.rx_auto_segmentation = supported;

        // Leave the bus in a defined state: tester present with suppressed
        // response, not waiting for any reply.
        let settle = AdapterCommand::Data {
            bytes: vec![0x3E, 0x80],
            expected_responses: Some(0),
        };
        let _ = self.queue.send(&settle.wire(), COMMAND_TIMEOUT).await;
        debug!(supported, "segmentation probe");
    }

    fn install_codecs(&mut self, protocol: BusProtocol) {
        let (encoder, decoder): (Box<dyn PayloadEncoder>, Box<dyn PayloadDecoder>) = match protocol
        {
            BusProtocol::J1850Pwm | BusProtocol::J1850Vpwm => {
                (Box::new(NullEncoder::new(7)), Box::new(J1850Decoder))
            }
            BusProtocol::Iso9141_2 => (Box::new(NullEncoder::new(7)), Box::new(Iso9141Decoder)),
            BusProtocol::Kwp2000Slow | BusProtocol::Kwp2000Fast => {
                (Box::new(NullEncoder::new(7)), Box::new(Kwp2000Decoder))
            }
            can if can.is_can() => {
                let encoder = if self.tx_auto_segmentation {
                    NullEncoder::new(self.info.chip.auto_segmentation_limit())
                } else if self.can_auto_format {
                    NullEncoder::new(7)
                } else {
                    NullEncoder::new(8)
                };
                let decoder: Box<dyn PayloadDecoder> = if self.rx_auto_segmentation {
                    Box::new(NullDecoder)
                } else {
                    Box::new(IsoTpDecoder)
                };
                (Box::new(encoder), decoder)
            }
            _ => (Box::new(NullEncoder::new(7)), Box::new(NullDecoder)),
        };
        self.encoder = encoder;
        self.decoder = decoder;
    }

    async fn ensure_headers(&mut self, message: &Message) -> Result<()> {
        if message.id.is_set() && message.id != self.current_header {
            self.command(&AdapterCommand::SetHeader(message.id), COMMAND_TIMEOUT)
                .await?;
            self.current_header = message.id;
        }
        if message.reply.is_set() && message.reply != self.current_arbitration {
            self.command(
                &AdapterCommand::CanReceiveArbitration(message.reply),
                COMMAND_TIMEOUT,
            )
            .await?;
            self.current_arbitration = message.reply;
        }
        Ok(())
    }

    fn set_state(&self, next: AdapterState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                debug!(state = ?next, "adapter state");
                *current = next;
                true
            }
        });
    }
}

/// `[0x7F, sid, 0x78]` at the given offset marks a transient
/// "response pending" frame.
fn is_transient_pending(bytes: &[u8], sid: u8, offset: usize) -> bool {
    matches!(
        bytes.get(offset..offset + 3),
        Some([0x7F, s, 0x78]) if *s == sid
    )
}

/// Interpret probe reply lines as messages, skipping anything that does not
/// parse as header + hex payload.
fn lenient_messages(lines: &[String], header_chars: usize) -> Vec<Message> {
    let mut messages = Vec::new();
    for line in lines {
        let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.len() <= header_chars {
            continue;
        }
        let Ok(id) = Header::from_hex(&compact[..header_chars]) else {
            continue;
        };
        let Ok(bytes) = hex::decode(&compact[header_chars..]) else {
            continue;
        };
        messages.push(Message::request(id, bytes));
    }
    messages
}
