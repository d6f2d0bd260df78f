//! Bidirectional ISO-TP transceiver.
//!
//! The transceiver is sans-IO: it owns segmentation state for one logical
//! endpoint but never touches a wire. The caller starts a send with
//! [`Transceiver::write`], feeds every received 8-byte frame through
//! [`Transceiver::did_read`], and carries out the returned [`Action`]s
//! (transmit frames, deliver a payload, or do nothing).

use canterm_interface::{Error, Result};

use crate::pdu::{FlowControlFrame, FlowStatus, FrameType, FRAME_LEN, MAX_PAYLOAD};

/// What the caller must do after feeding the transceiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// A complete inbound payload is ready.
    Process(Vec<u8>),
    /// Transmit these frames, pacing consecutive ones by `separation_time`
    /// (raw STmin byte, milliseconds in the common range). `last_batch` is
    /// true iff this logical send emits no further frames.
    WriteFrames {
        frames: Vec<Vec<u8>>,
        separation_time: u8,
        last_batch: bool,
    },
    /// Nothing to do.
    WaitForMore,
}

/// How the transceiver reacts to protocol violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    /// Reset and try to reinterpret the offending frame as the start of a new
    /// message; swallow it if that also fails. `did_read` never errors except
    /// for the frame-length check.
    #[default]
    Defensive,
    /// Surface every violation without touching state.
    Strict,
}

/// Transceiver configuration.
#[derive(Debug, Clone)]
pub struct TransceiverConfig {
    pub behavior: Behavior,
    /// Block size advertised in our flow control frames (0 = no block ACKs).
    pub block_size: u8,
    /// Separation time advertised in our flow control frames (raw STmin).
    pub separation_time: u8,
    /// Optional padding byte for transmitted frames (None = unpadded).
    pub padding: Option<u8>,
}

impl Default for TransceiverConfig {
    /// Defensive behavior, "send everything without pause, no block ACKs".
    fn default() -> Self {
        Self {
            behavior: Behavior::Defensive,
            block_size: 0,
            separation_time: 0,
            padding: None,
        }
    }
}

/// Transfer direction currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransceiverState {
    #[default]
    Idle,
    Sending,
    Receiving,
}

/// Bidirectional segmentation state machine for one logical endpoint.
///
/// Created once and reused; [`Transceiver::reset`] returns it to idle and
/// clears both directions. Not internally synchronized: `write` and
/// `did_read` must not run concurrently on the same instance.
#[derive(Debug)]
pub struct Transceiver {
    cfg: TransceiverConfig,
    state: TransceiverState,
    // Send direction.
    outbound: Vec<u8>,
    offset: usize,
    next_sn: u8,
    // Receive direction.
    assembly: Vec<u8>,
    remaining: usize,
    flow_control_counter: u8,
    expected_sn: u8,
}

impl Default for Transceiver {
    fn default() -> Self {
        Self::new(TransceiverConfig::default())
    }
}

impl Transceiver {
    /// Build a transceiver with the given configuration.
    pub fn new(cfg: TransceiverConfig) -> Self {
        Self {
            cfg,
            state: TransceiverState::Idle,
            outbound: Vec::new(),
            offset: 0,
            next_sn: 0,
            assembly: Vec::new(),
            remaining: 0,
            flow_control_counter: 0,
            expected_sn: 0,
        }
    }

    /// Current transfer state.
    pub fn state(&self) -> TransceiverState {
        self.state
    }

    /// Return to idle, clearing both directions.
    pub fn reset(&mut self) {
        self.state = TransceiverState::Idle;
        self.outbound.clear();
        self.offset = 0;
        self.next_sn = 0;
        self.assembly.clear();
        self.remaining = 0;
        self.flow_control_counter = 0;
        self.expected_sn = 0;
    }

    /// Initiate a send.
    ///
    /// Small payloads complete immediately with a single-frame batch. Larger
    /// ones emit the First Frame and park the tail until the peer's flow
    /// control arrives through [`Transceiver::did_read`].
    pub fn write(&mut self, payload: &[u8]) -> Result<Action> {
        if payload.is_empty() {
            return Err(Error::MessageTooSmall);
        }
        if payload.len() > MAX_PAYLOAD {
            return Err(Error::MessageTooBig);
        }
        if self.state != TransceiverState::Idle {
            return Err(Error::ProtocolViolation(format!(
                "write while {:?}",
                self.state
            )));
        }

        if payload.len() <= 7 {
            let mut frame = Vec::with_capacity(FRAME_LEN);
            frame.push(payload.len() as u8);
            frame.extend_from_slice(payload);
            return Ok(Action::WriteFrames {
                frames: vec![self.pad(frame)],
                separation_time: 0,
                last_batch: true,
            });
        }

        let mut first = Vec::with_capacity(FRAME_LEN);
        first.push(0x10 | ((payload.len() >> 8) as u8));
        first.push((payload.len() & 0xFF) as u8);
        first.extend_from_slice(&payload[..6]);

        self.outbound = payload.to_vec();
        self.offset = 6;
        self.next_sn = 1;
        self.state = TransceiverState::Sending;

        Ok(Action::WriteFrames {
            frames: vec![self.pad(first)],
            separation_time: 0,
            last_batch: false,
        })
    }

    /// Ingest one received 8-byte frame.
    pub fn did_read(&mut self, bytes: &[u8]) -> Result<Action> {
        if bytes.len() != FRAME_LEN {
            return Err(Error::ProtocolViolation(format!(
                "frame length {} != {FRAME_LEN}",
                bytes.len()
            )));
        }

        match self.cfg.behavior {
            Behavior::Strict => self.dispatch(bytes),
            Behavior::Defensive => match self.dispatch(bytes) {
                Ok(action) => Ok(action),
                Err(_) => {
                    self.reset();
                    match self.dispatch(bytes) {
                        Ok(action) => Ok(action),
                        Err(_) => {
                            self.reset();
                            Ok(Action::WaitForMore)
                        }
                    }
                }
            },
        }
    }

    fn dispatch(&mut self, bytes: &[u8]) -> Result<Action> {
        if self.state == TransceiverState::Sending {
            return self.continue_send(bytes);
        }

        let frame_type = FrameType::from_pci(bytes[0]).ok_or_else(|| {
            Error::ProtocolViolation(format!("reserved PCI 0x{:02X}", bytes[0]))
        })?;
        match frame_type {
            FrameType::Single => self.accept_single(bytes),
            FrameType::First => self.accept_first(bytes),
            FrameType::Consecutive => self.accept_consecutive(bytes),
            FrameType::FlowControl => Err(Error::ProtocolViolation(format!(
                "flow control while {:?}",
                self.state
            ))),
        }
    }

    /// Flow control handling while a segmented send is in flight.
    fn continue_send(&mut self, bytes: &[u8]) -> Result<Action> {
        if FrameType::from_pci(bytes[0]) != Some(FrameType::FlowControl) {
            return Err(Error::ProtocolViolation(format!(
                "expected flow control while sending, got PCI 0x{:02X}",
                bytes[0]
            )));
        }
        let fc = FlowControlFrame::parse(bytes)
            .map_err(|err| Error::ProtocolViolation(err.to_string()))?;

        match fc.status {
            FlowStatus::Wait => Ok(Action::WaitForMore),
            FlowStatus::Overflow => {
                // Strict mode leaves the aborted send intact for the caller
                // to reset.
                if self.cfg.behavior == Behavior::Defensive {
                    self.reset();
                }
                Err(Error::ProtocolViolation(
                    "peer aborted transfer with flow control overflow".into(),
                ))
            }
            FlowStatus::ClearToSend => {
                let budget = if fc.block_size == 0 {
                    usize::MAX
                } else {
                    fc.block_size as usize
                };

                let mut frames = Vec::new();
                while self.offset < self.outbound.len() && frames.len() < budget {
                    let take = (self.outbound.len() - self.offset).min(7);
                    let mut frame = Vec::with_capacity(FRAME_LEN);
                    frame.push(0x20 | (self.next_sn & 0x0F));
                    frame.extend_from_slice(&self.outbound[self.offset..self.offset + take]);
                    frames.push(self.pad(frame));
                    self.offset += take;
                    self.next_sn = (self.next_sn + 1) & 0x0F;
                }

                let last_batch = self.offset >= self.outbound.len();
                if last_batch {
                    self.reset();
                }
                Ok(Action::WriteFrames {
                    frames,
                    separation_time: fc.separation_time,
                    last_batch,
                })
            }
        }
    }

    fn accept_single(&mut self, bytes: &[u8]) -> Result<Action> {
        if self.state != TransceiverState::Idle {
            return Err(Error::ProtocolViolation(
                "single frame during segmented receive".into(),
            ));
        }
        let data_length = (bytes[0] & 0x0F) as usize;
        if !(1..=7).contains(&data_length) {
            return Err(Error::ProtocolViolation(format!(
                "invalid single frame length {data_length}"
            )));
        }
        Ok(Action::Process(bytes[1..=data_length].to_vec()))
    }

    fn accept_first(&mut self, bytes: &[u8]) -> Result<Action> {
        if self.state != TransceiverState::Idle {
            return Err(Error::ProtocolViolation(
                "first frame during segmented receive".into(),
            ));
        }
        let total = (((bytes[0] & 0x0F) as usize) << 8) | bytes[1] as usize;
        if total <= 7 {
            return Err(Error::ProtocolViolation(format!(
                "first frame length {total} below single frame threshold"
            )));
        }

        self.assembly.clear();
        self.assembly.extend_from_slice(&bytes[2..FRAME_LEN]);
        self.remaining = total - 6;
        self.flow_control_counter = self.cfg.block_size;
        self.expected_sn = 1;
        self.state = TransceiverState::Receiving;

        Ok(self.flow_control_action())
    }

    fn accept_consecutive(&mut self, bytes: &[u8]) -> Result<Action> {
        if self.state != TransceiverState::Receiving {
            return Err(Error::ProtocolViolation(
                "consecutive frame while idle".into(),
            ));
        }
        let sn = bytes[0] & 0x0F;
        if sn != self.expected_sn {
            return Err(Error::ProtocolViolation(format!(
                "sequence number {sn} != expected {}",
                self.expected_sn
            )));
        }

        let take = self.remaining.min(7);
        self.assembly.extend_from_slice(&bytes[1..1 + take]);
        self.remaining -= take;
        self.expected_sn = (self.expected_sn + 1) & 0x0F;

        if self.remaining == 0 {
            let payload = core::mem::take(&mut self.assembly);
            self.reset();
            return Ok(Action::Process(payload));
        }

        if self.cfg.block_size == 0 {
            return Ok(Action::WaitForMore);
        }
        self.flow_control_counter -= 1;
        if self.flow_control_counter == 0 {
            self.flow_control_counter = self.cfg.block_size;
            return Ok(self.flow_control_action());
        }
        Ok(Action::WaitForMore)
    }

    fn flow_control_action(&self) -> Action {
        let fc = FlowControlFrame::clear_to_send(self.cfg.block_size, self.cfg.separation_time);
        Action::WriteFrames {
            frames: vec![self.pad(fc.to_bytes().to_vec())],
            separation_time: 0,
            last_batch: false,
        }
    }

    fn pad(&self, mut frame: Vec<u8>) -> Vec<u8> {
        if let Some(byte) = self.cfg.padding {
            frame.resize(FRAME_LEN, byte);
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(bytes: &[u8]) -> Vec<u8> {
        let mut out = bytes.to_vec();
        out.resize(FRAME_LEN, 0xAA);
        out
    }

    #[test]
    fn single_frame_receive_stays_idle() {
        let mut t = Transceiver::default();
        let action = t.did_read(&frame(&[0x02, 0x09, 0x02])).unwrap();
        assert_eq!(action, Action::Process(vec![0x09, 0x02]));
        assert_eq!(t.state(), TransceiverState::Idle);
    }

    #[test]
    fn short_write_completes_immediately() {
        let mut t = Transceiver::default();
        let action = t.write(&[0x09, 0x02]).unwrap();
        assert_eq!(
            action,
            Action::WriteFrames {
                frames: vec![vec![0x02, 0x09, 0x02]],
                separation_time: 0,
                last_batch: true,
            }
        );
        assert_eq!(t.state(), TransceiverState::Idle);
    }

    #[test]
    fn bad_frame_length_is_always_an_error() {
        let mut t = Transceiver::default();
        assert!(matches!(
            t.did_read(&[0x02, 0x09]),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn write_bounds() {
        let mut t = Transceiver::default();
        assert_eq!(t.write(&[]), Err(Error::MessageTooSmall));
        assert_eq!(t.write(&[0u8; 4096]), Err(Error::MessageTooBig));
    }

    #[test]
    fn write_while_sending_is_rejected() {
        let mut t = Transceiver::default();
        t.write(&[0u8; 20]).unwrap();
        assert!(matches!(
            t.write(&[0x01]),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn flow_control_wait_pauses_the_send() {
        let mut t = Transceiver::default();
        t.write(&(0u8..20).collect::<Vec<_>>()).unwrap();
        let action = t.did_read(&frame(&[0x31, 0x00, 0x00])).unwrap();
        assert_eq!(action, Action::WaitForMore);
        assert_eq!(t.state(), TransceiverState::Sending);

        // The next clear-to-send resumes where the first frame left off.
        match t.did_read(&frame(&[0x30, 0x00, 0x00])).unwrap() {
            Action::WriteFrames {
                frames, last_batch, ..
            } => {
                assert!(last_batch);
                assert_eq!(frames[0][0], 0x21);
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(t.state(), TransceiverState::Idle);
    }

    #[test]
    fn flow_control_overflow_errors_in_strict_mode_without_state_change() {
        let mut t = Transceiver::new(TransceiverConfig {
            behavior: Behavior::Strict,
            ..TransceiverConfig::default()
        });
        t.write(&(0u8..20).collect::<Vec<_>>()).unwrap();
        assert!(matches!(
            t.did_read(&frame(&[0x32, 0x00, 0x00])),
            Err(Error::ProtocolViolation(_))
        ));
        assert_eq!(t.state(), TransceiverState::Sending);

        // The untouched send still completes on a clear-to-send.
        match t.did_read(&frame(&[0x30, 0x00, 0x00])).unwrap() {
            Action::WriteFrames {
                frames, last_batch, ..
            } => {
                assert!(last_batch);
                assert_eq!(frames[0][0], 0x21);
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(t.state(), TransceiverState::Idle);
    }

    #[test]
    fn flow_control_overflow_swallowed_defensively() {
        let mut t = Transceiver::default();
        t.write(&(0u8..20).collect::<Vec<_>>()).unwrap();
        let action = t.did_read(&frame(&[0x32, 0x00, 0x00])).unwrap();
        assert_eq!(action, Action::WaitForMore);
        assert_eq!(t.state(), TransceiverState::Idle);
    }
}
