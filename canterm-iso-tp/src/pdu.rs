//! ISO-TP protocol control information primitives.

use core::time::Duration;

use canterm_interface::{Error, Result};

/// Classic CAN frame payload length.
pub const FRAME_LEN: usize = 8;

/// Largest transferable payload (3-nibble length field).
pub const MAX_PAYLOAD: usize = 4095;

/// Most frames a single transfer can need: one First Frame carrying 6 bytes
/// plus 585 Consecutive Frames, the last carrying a single byte.
pub const MAX_FRAMES: usize = 586;

/// Frame type encoded in the PCI high nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Single,
    First,
    Consecutive,
    FlowControl,
}

impl FrameType {
    /// Classify a PCI byte. `None` for reserved high nibbles.
    pub fn from_pci(pci: u8) -> Option<FrameType> {
        match pci >> 4 {
            0x0 => Some(FrameType::Single),
            0x1 => Some(FrameType::First),
            0x2 => Some(FrameType::Consecutive),
            0x3 => Some(FrameType::FlowControl),
            _ => None,
        }
    }
}

/// Flow control status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// Clear to send more consecutive frames.
    ClearToSend,
    /// Pause and await another flow control frame.
    Wait,
    /// Receiver cannot take the transfer; abort.
    Overflow,
}

impl FlowStatus {
    /// Map a wire byte (`0x30..=0x32`) to a status.
    pub fn from_byte(byte: u8) -> Option<FlowStatus> {
        match byte {
            0x30 => Some(FlowStatus::ClearToSend),
            0x31 => Some(FlowStatus::Wait),
            0x32 => Some(FlowStatus::Overflow),
            _ => None,
        }
    }

    /// The wire byte of this status.
    pub fn byte(self) -> u8 {
        match self {
            FlowStatus::ClearToSend => 0x30,
            FlowStatus::Wait => 0x31,
            FlowStatus::Overflow => 0x32,
        }
    }
}

/// A flow control frame: `[status, block size, separation time]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowControlFrame {
    pub status: FlowStatus,
    /// Consecutive frames allowed before the next flow control (0 = all).
    pub block_size: u8,
    /// Raw STmin byte as delivered on the wire.
    pub separation_time: u8,
}

impl Default for FlowControlFrame {
    fn default() -> Self {
        Self {
            status: FlowStatus::ClearToSend,
            block_size: 0x20,
            separation_time: 0,
        }
    }
}

impl FlowControlFrame {
    /// Clear-to-send frame with the given pacing parameters.
    pub fn clear_to_send(block_size: u8, separation_time: u8) -> Self {
        Self {
            status: FlowStatus::ClearToSend,
            block_size,
            separation_time,
        }
    }

    /// Parse the first three bytes of a received frame.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 3 {
            return Err(Error::Decoder(format!(
                "flow control needs 3 bytes, got {}",
                bytes.len()
            )));
        }
        let status = FlowStatus::from_byte(bytes[0]).ok_or_else(|| {
            Error::Decoder(format!("unknown flow control status 0x{:02X}", bytes[0]))
        })?;
        Ok(Self {
            status,
            block_size: bytes[1],
            separation_time: bytes[2],
        })
    }

    /// Wire form, exactly three bytes.
    pub fn to_bytes(self) -> [u8; 3] {
        [self.status.byte(), self.block_size, self.separation_time]
    }
}

/// Convert an STmin byte to a duration, `None` for reserved values.
///
/// The wire encoding packs two disjoint ranges into one byte: plain
/// milliseconds in `0x00..=0x7F`, and 100 µs steps behind `0xF1..=0xF9`.
pub fn st_min_to_duration(raw: u8) -> Option<Duration> {
    if raw <= 0x7F {
        return Some(Duration::from_millis(u64::from(raw)));
    }
    if (0xF1..=0xF9).contains(&raw) {
        let steps = u64::from(raw - 0xF0);
        return Some(Duration::from_micros(steps * 100));
    }
    None
}

/// Encode a duration as an STmin byte, clamping to the supported range.
///
/// Sub-millisecond durations only have a wire form on whole 100 µs steps;
/// anything else in that range degrades to 0.
pub fn duration_to_st_min(duration: Duration) -> u8 {
    let micros = duration.as_micros();
    if micros > 0 && micros < 1000 {
        return match (micros / 100, micros % 100) {
            (steps @ 1..=9, 0) => 0xF0 + steps as u8,
            _ => 0,
        };
    }
    (micros / 1000).min(0x7F) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_type_classification() {
        assert_eq!(FrameType::from_pci(0x02), Some(FrameType::Single));
        assert_eq!(FrameType::from_pci(0x10), Some(FrameType::First));
        assert_eq!(FrameType::from_pci(0x2F), Some(FrameType::Consecutive));
        assert_eq!(FrameType::from_pci(0x30), Some(FrameType::FlowControl));
        assert_eq!(FrameType::from_pci(0x40), None);
        assert_eq!(FrameType::from_pci(0xFF), None);
    }

    #[test]
    fn flow_control_round_trip() {
        let fc = FlowControlFrame::clear_to_send(0x40, 0x01);
        assert_eq!(fc.to_bytes(), [0x30, 0x40, 0x01]);
        assert_eq!(FlowControlFrame::parse(&fc.to_bytes()).unwrap(), fc);
    }

    #[test]
    fn flow_control_defaults() {
        let fc = FlowControlFrame::default();
        assert_eq!(fc.block_size, 0x20);
        assert_eq!(fc.separation_time, 0);
        assert_eq!(fc.status, FlowStatus::ClearToSend);
    }

    #[test]
    fn flow_control_rejects_short_and_unknown() {
        assert!(FlowControlFrame::parse(&[0x30, 0x00]).is_err());
        assert!(FlowControlFrame::parse(&[0x33, 0x00, 0x00]).is_err());
        // Extra bytes beyond the first three are padding and ignored.
        assert!(FlowControlFrame::parse(&[0x31, 0x08, 0x14, 0xAA, 0xAA]).is_ok());
    }

    #[test]
    fn st_min_conversions() {
        assert_eq!(st_min_to_duration(0x00), Some(Duration::from_millis(0)));
        assert_eq!(st_min_to_duration(0x7F), Some(Duration::from_millis(127)));
        assert_eq!(st_min_to_duration(0xF1), Some(Duration::from_micros(100)));
        assert_eq!(st_min_to_duration(0x80), None);
        assert_eq!(st_min_to_duration(0xF0), None);

        assert_eq!(duration_to_st_min(Duration::from_millis(5)), 5);
        assert_eq!(duration_to_st_min(Duration::from_micros(300)), 0xF3);
        assert_eq!(duration_to_st_min(Duration::from_secs(10)), 0x7F);
    }
}
