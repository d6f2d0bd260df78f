//! Vehicle bus protocol tags and their adapter-facing attributes.

use core::fmt;

/// The bus protocol an ELM-class adapter can be asked to speak.
///
/// The discriminants mirror the adapter's `ATSP`/`ATTP` numbering; see
/// [`BusProtocol::elm_digit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BusProtocol {
    /// Not negotiated (the adapter reported nothing usable).
    #[default]
    Unknown,
    /// Let the adapter probe (`ATSP0`); never a valid negotiated result.
    Auto,
    J1850Pwm,
    J1850Vpwm,
    Iso9141_2,
    Kwp2000Slow,
    Kwp2000Fast,
    Can11Bit500k,
    Can29Bit500k,
    Can11Bit250k,
    Can29Bit250k,
    SaeJ1939,
    User1Can11Bit125k,
    User2Can11Bit50k,
}

impl BusProtocol {
    /// All concrete protocols in adapter probing order.
    pub const ALL: [BusProtocol; 12] = [
        BusProtocol::J1850Pwm,
        BusProtocol::J1850Vpwm,
        BusProtocol::Iso9141_2,
        BusProtocol::Kwp2000Slow,
        BusProtocol::Kwp2000Fast,
        BusProtocol::Can11Bit500k,
        BusProtocol::Can29Bit500k,
        BusProtocol::Can11Bit250k,
        BusProtocol::Can29Bit250k,
        BusProtocol::SaeJ1939,
        BusProtocol::User1Can11Bit125k,
        BusProtocol::User2Can11Bit50k,
    ];

    /// Whether the protocol runs on a CAN physical layer.
    pub fn is_can(self) -> bool {
        matches!(
            self,
            BusProtocol::Can11Bit500k
                | BusProtocol::Can29Bit500k
                | BusProtocol::Can11Bit250k
                | BusProtocol::Can29Bit250k
                | BusProtocol::SaeJ1939
                | BusProtocol::User1Can11Bit125k
                | BusProtocol::User2Can11Bit50k
        )
    }

    /// Whether this is a concrete, negotiated protocol.
    pub fn is_valid(self) -> bool {
        !matches!(self, BusProtocol::Unknown | BusProtocol::Auto)
    }

    /// Whether headers render as 8 hex chars (29-bit) rather than 3.
    pub fn uses_extended_headers(self) -> bool {
        matches!(
            self,
            BusProtocol::Can29Bit500k | BusProtocol::Can29Bit250k | BusProtocol::SaeJ1939
        )
    }

    /// Number of hex characters the adapter prefixes to each reply line when
    /// headers are shown.
    pub fn header_chars(self) -> usize {
        if self.uses_extended_headers() { 8 } else { 3 }
    }

    /// Conventional functional ("query any ECU") header for this protocol,
    /// rendered the way `ATSH` expects it.
    pub fn broadcast_header(self) -> &'static str {
        match self {
            BusProtocol::J1850Pwm => "616AF1",
            BusProtocol::J1850Vpwm | BusProtocol::Iso9141_2 => "686AF1",
            BusProtocol::Kwp2000Slow | BusProtocol::Kwp2000Fast => "C233F1",
            BusProtocol::Can29Bit500k | BusProtocol::Can29Bit250k | BusProtocol::SaeJ1939 => {
                "18DB33F1"
            }
            _ => "7DF",
        }
    }

    /// The digit used with `ATSP` / `ATTP`.
    pub fn elm_digit(self) -> char {
        match self {
            BusProtocol::Unknown | BusProtocol::Auto => '0',
            BusProtocol::J1850Pwm => '1',
            BusProtocol::J1850Vpwm => '2',
            BusProtocol::Iso9141_2 => '3',
            BusProtocol::Kwp2000Slow => '4',
            BusProtocol::Kwp2000Fast => '5',
            BusProtocol::Can11Bit500k => '6',
            BusProtocol::Can29Bit500k => '7',
            BusProtocol::Can11Bit250k => '8',
            BusProtocol::Can29Bit250k => '9',
            BusProtocol::SaeJ1939 => 'A',
            BusProtocol::User1Can11Bit125k => 'B',
            BusProtocol::User2Can11Bit50k => 'C',
        }
    }

    /// Map an `ATSP`-style digit back to a protocol tag.
    pub fn from_elm_digit(digit: char) -> BusProtocol {
        match digit {
            '0' => BusProtocol::Auto,
            '1' => BusProtocol::J1850Pwm,
            '2' => BusProtocol::J1850Vpwm,
            '3' => BusProtocol::Iso9141_2,
            '4' => BusProtocol::Kwp2000Slow,
            '5' => BusProtocol::Kwp2000Fast,
            '6' => BusProtocol::Can11Bit500k,
            '7' => BusProtocol::Can29Bit500k,
            '8' => BusProtocol::Can11Bit250k,
            '9' => BusProtocol::Can29Bit250k,
            'A' | 'a' => BusProtocol::SaeJ1939,
            'B' | 'b' => BusProtocol::User1Can11Bit125k,
            'C' | 'c' => BusProtocol::User2Can11Bit50k,
            _ => BusProtocol::Unknown,
        }
    }

    /// Parse an `ATDPN` reply. A leading `A` marks an auto-detected protocol
    /// and is stripped before mapping the digit.
    pub fn from_dpn_response(text: &str) -> BusProtocol {
        let trimmed = text.trim();
        let digits = trimmed.strip_prefix(['A', 'a']).filter(|_| trimmed.len() > 1);
        match digits.unwrap_or(trimmed).chars().next() {
            Some(digit) => BusProtocol::from_elm_digit(digit),
            None => BusProtocol::Unknown,
        }
    }
}

impl fmt::Display for BusProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BusProtocol::Unknown => "unknown",
            BusProtocol::Auto => "auto",
            BusProtocol::J1850Pwm => "SAE J1850 PWM",
            BusProtocol::J1850Vpwm => "SAE J1850 VPWM",
            BusProtocol::Iso9141_2 => "ISO 9141-2",
            BusProtocol::Kwp2000Slow => "KWP2000 (5 baud init)",
            BusProtocol::Kwp2000Fast => "KWP2000 (fast init)",
            BusProtocol::Can11Bit500k => "CAN 11bit/500k",
            BusProtocol::Can29Bit500k => "CAN 29bit/500k",
            BusProtocol::Can11Bit250k => "CAN 11bit/250k",
            BusProtocol::Can29Bit250k => "CAN 29bit/250k",
            BusProtocol::SaeJ1939 => "SAE J1939",
            BusProtocol::User1Can11Bit125k => "user1 CAN 11bit/125k",
            BusProtocol::User2Can11Bit50k => "user2 CAN 11bit/50k",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_round_trip() {
        for protocol in BusProtocol::ALL {
            assert_eq!(BusProtocol::from_elm_digit(protocol.elm_digit()), protocol);
        }
    }

    #[test]
    fn dpn_strips_auto_prefix() {
        assert_eq!(
            BusProtocol::from_dpn_response("A6"),
            BusProtocol::Can11Bit500k
        );
        assert_eq!(BusProtocol::from_dpn_response("3"), BusProtocol::Iso9141_2);
        // A bare "A" is J1939, not an empty auto prefix.
        assert_eq!(BusProtocol::from_dpn_response("A"), BusProtocol::SaeJ1939);
        assert_eq!(BusProtocol::from_dpn_response(""), BusProtocol::Unknown);
    }

    #[test]
    fn can_classification() {
        assert!(BusProtocol::Can11Bit500k.is_can());
        assert!(BusProtocol::SaeJ1939.is_can());
        assert!(!BusProtocol::Iso9141_2.is_can());
        assert!(!BusProtocol::Auto.is_valid());
        assert!(!BusProtocol::Unknown.is_valid());
    }

    #[test]
    fn header_widths() {
        assert_eq!(BusProtocol::Can11Bit500k.header_chars(), 3);
        assert_eq!(BusProtocol::Can29Bit500k.header_chars(), 8);
        assert_eq!(BusProtocol::SaeJ1939.header_chars(), 8);
        assert_eq!(BusProtocol::Iso9141_2.header_chars(), 3);
    }

    #[test]
    fn broadcast_headers() {
        assert_eq!(BusProtocol::Can11Bit500k.broadcast_header(), "7DF");
        assert_eq!(BusProtocol::Can29Bit250k.broadcast_header(), "18DB33F1");
        assert_eq!(BusProtocol::Kwp2000Fast.broadcast_header(), "C233F1");
    }
}
