//! Adapter command catalogue: abstract operations, their ASCII wire forms and
//! the matching response parsers.
//!
//! The queue moves opaque lines; everything the stack knows about ELM/STN
//! command semantics is concentrated here.

use canterm_interface::{BusProtocol, Error, Header, Message, Result};

/// An abstract adapter operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCommand {
    /// Single-character wakeup; the reply (if any) is ignored.
    Wake,
    /// `ATZ` full reset.
    Reset,
    Echo(bool),
    Linefeed(bool),
    ShowHeaders(bool),
    Spaces(bool),
    AdaptiveTiming(bool),
    SetHeader(Header),
    /// `ATSH` with a pre-rendered header string, for the 3-byte functional
    /// headers of the non-CAN protocols.
    SetRawHeader(String),
    CanReceiveArbitration(Header),
    SetProtocol(BusProtocol),
    TryProtocol(BusProtocol),
    DescribeProtocolNumeric,
    CanAutoFormat(bool),
    /// `ATST` in units of 4 ms, hex argument.
    SetTimeout(u8),
    ReadVoltage,
    /// OBD-II mode 01 PID 00 probe used to force bus negotiation.
    ConnectProbe,
    /// Hex-encoded payload, optionally suffixed with the expected number of
    /// reply messages (single hex nibble).
    Data {
        bytes: Vec<u8>,
        expected_responses: Option<u8>,
    },
    /// STN `STPX` transmit announcement; the adapter answers `DATA` and then
    /// expects the payload as the next line.
    StnTransmitAnnounce {
        header: Header,
        reply: Header,
        length: usize,
    },
    StnTxSegmentation(bool),
    StnRxSegmentation(bool),
    /// `ATI` adapter identification.
    Identify,
    /// `AT@1` device description.
    DeviceDescription,
    /// `STI` STN identification.
    StnIdentify,
    /// `STIX` STN extended identification.
    StnExtendedIdentify,
    /// `AT#1` UniCarScan identification.
    UniCarScanIdentify,
}

/// Parsed reply for an [`AdapterCommand`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResponse {
    /// The adapter confirmed the command.
    Acknowledged,
    /// Free-form identification text.
    Text(String),
    /// Battery voltage in volts.
    Voltage(f32),
    /// Bus protocol reported by `ATDPN`.
    Protocol(BusProtocol),
    /// ECU reply lines split into header + payload bytes.
    Messages(Vec<Message>),
    /// Raw ECU lines (headers not yet interpreted).
    Lines(Vec<String>),
}

fn flag(on: &bool) -> char {
    if *on { '1' } else { '0' }
}

impl AdapterCommand {
    /// The ASCII wire form, without the trailing carriage return.
    pub fn wire(&self) -> String {
        match self {
            AdapterCommand::Wake => " ".into(),
            AdapterCommand::Reset => "ATZ".into(),
            AdapterCommand::Echo(on) => format!("ATE{}", flag(on)),
            AdapterCommand::Linefeed(on) => format!("ATL{}", flag(on)),
            AdapterCommand::ShowHeaders(on) => format!("ATH{}", flag(on)),
            AdapterCommand::Spaces(on) => format!("ATS{}", flag(on)),
            AdapterCommand::AdaptiveTiming(on) => format!("ATAT{}", flag(on)),
            AdapterCommand::SetHeader(header) => format!("ATSH{header}"),
            AdapterCommand::SetRawHeader(header) => format!("ATSH{header}"),
            AdapterCommand::CanReceiveArbitration(header) => format!("ATCRA{header}"),
            AdapterCommand::SetProtocol(protocol) => format!("ATSP{}", protocol.elm_digit()),
            AdapterCommand::TryProtocol(protocol) => format!("ATTP{}", protocol.elm_digit()),
            AdapterCommand::DescribeProtocolNumeric => "ATDPN".into(),
            AdapterCommand::CanAutoFormat(on) => format!("ATCAF{}", flag(on)),
            AdapterCommand::SetTimeout(value) => format!("ATST{value:02X}"),
            AdapterCommand::ReadVoltage => "ATRV".into(),
            AdapterCommand::ConnectProbe => "0100".into(),
            AdapterCommand::Data {
                bytes,
                expected_responses,
            } => {
                let mut line = hex::encode_upper(bytes);
                if let Some(count) = expected_responses {
                    let nibble = char::from_digit((*count & 0x0F) as u32, 16).unwrap_or('0');
                    line.push(nibble.to_ascii_uppercase());
                }
                line
            }
            AdapterCommand::StnTransmitAnnounce {
                header,
                reply,
                length,
            } => format!("STPXh:{header},r:{reply},l:{length}"),
            AdapterCommand::StnTxSegmentation(on) => format!("STCSEGT{}", flag(on)),
            AdapterCommand::StnRxSegmentation(on) => format!("STCSEGR{}", flag(on)),
            AdapterCommand::Identify => "ATI".into(),
            AdapterCommand::DeviceDescription => "AT@1".into(),
            AdapterCommand::StnIdentify => "STI".into(),
            AdapterCommand::StnExtendedIdentify => "STIX".into(),
            AdapterCommand::UniCarScanIdentify => "AT#1".into(),
        }
    }

    /// Termination byte overriding the prompt, for commands whose reply does
    /// not end in `>`.
    pub fn termination_override(&self) -> Option<u8> {
        match self {
            AdapterCommand::StnTransmitAnnounce { .. } => Some(b'\r'),
            _ => None,
        }
    }

    /// Parse the raw framed response for this command.
    ///
    /// `header_chars` is the number of hex characters the negotiated bus
    /// protocol prefixes to each ECU line (3 or 8).
    pub fn parse(&self, raw: &str, header_chars: usize) -> Result<CommandResponse> {
        let lines = normalize(raw, &self.wire())?;
        match self {
            AdapterCommand::Wake => Ok(CommandResponse::Acknowledged),
            AdapterCommand::Reset
            | AdapterCommand::Identify
            | AdapterCommand::DeviceDescription
            | AdapterCommand::StnIdentify
            | AdapterCommand::StnExtendedIdentify
            | AdapterCommand::UniCarScanIdentify => Ok(CommandResponse::Text(lines.join("\n"))),
            AdapterCommand::Echo(_)
            | AdapterCommand::Linefeed(_)
            | AdapterCommand::ShowHeaders(_)
            | AdapterCommand::Spaces(_)
            | AdapterCommand::AdaptiveTiming(_)
            | AdapterCommand::SetHeader(_)
            | AdapterCommand::SetRawHeader(_)
            | AdapterCommand::CanReceiveArbitration(_)
            | AdapterCommand::SetProtocol(_)
            | AdapterCommand::TryProtocol(_)
            | AdapterCommand::CanAutoFormat(_)
            | AdapterCommand::SetTimeout(_)
            | AdapterCommand::StnTxSegmentation(_)
            | AdapterCommand::StnRxSegmentation(_) => parse_acknowledgement(&lines),
            AdapterCommand::DescribeProtocolNumeric => Ok(CommandResponse::Protocol(
                BusProtocol::from_dpn_response(&lines[0]),
            )),
            AdapterCommand::ReadVoltage => parse_voltage(&lines[0]),
            AdapterCommand::ConnectProbe => Ok(CommandResponse::Lines(
                lines.into_iter().filter(|l| is_ecu_line(l)).collect(),
            )),
            AdapterCommand::Data { .. } => parse_data_lines(&lines, header_chars),
            AdapterCommand::StnTransmitAnnounce { .. } => {
                if lines.iter().any(|l| l == "DATA") {
                    Ok(CommandResponse::Acknowledged)
                } else {
                    Err(Error::UnexpectedResult(format!(
                        "expected DATA, got '{}'",
                        lines.join(" / ")
                    )))
                }
            }
        }
    }
}

/// Split a framed response into trimmed lines, dropping the command echo, and
/// normalize the common failure shapes.
fn normalize(raw: &str, echo: &str) -> Result<Vec<String>> {
    let lines: Vec<String> = raw
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != echo)
        .map(str::to_owned)
        .collect();
    if lines.is_empty() {
        return Err(Error::NoResponse);
    }
    if lines.iter().any(|line| line.contains('?')) {
        return Err(Error::UnrecognizedCommand);
    }
    if let Some(fault) = lines
        .iter()
        .find(|line| line.contains("ERROR") || line.contains("UNABLE"))
    {
        return Err(Error::Bus(fault.clone()));
    }
    Ok(lines)
}

fn parse_acknowledgement(lines: &[String]) -> Result<CommandResponse> {
    if lines.iter().any(|line| line.contains("OK")) {
        Ok(CommandResponse::Acknowledged)
    } else {
        Err(Error::UnexpectedResult(lines.join(" / ")))
    }
}

fn parse_voltage(line: &str) -> Result<CommandResponse> {
    let number = line.trim_end_matches(['V', 'v']).trim();
    number
        .parse::<f32>()
        .map(CommandResponse::Voltage)
        .map_err(|_| Error::InvalidFormat(format!("bad voltage '{line}'")))
}

/// An ECU reply line consists purely of hex digits (spaces allowed).
fn is_ecu_line(line: &str) -> bool {
    !line.is_empty()
        && line
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == ' ')
}

fn parse_data_lines(lines: &[String], header_chars: usize) -> Result<CommandResponse> {
    let mut messages = Vec::new();
    for line in lines.iter().filter(|l| is_ecu_line(l)) {
        let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.len() <= header_chars {
            continue;
        }
        let id = Header::from_hex(&compact[..header_chars])?;
        let bytes = hex::decode(&compact[header_chars..]).map_err(|_| Error::InvalidCharacters)?;
        messages.push(Message::request(id, bytes));
    }
    if messages.is_empty() {
        return Err(Error::NoResponse);
    }
    Ok(CommandResponse::Messages(messages))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_forms() {
        assert_eq!(AdapterCommand::Reset.wire(), "ATZ");
        assert_eq!(AdapterCommand::Echo(false).wire(), "ATE0");
        assert_eq!(AdapterCommand::ShowHeaders(true).wire(), "ATH1");
        assert_eq!(
            AdapterCommand::SetHeader(Header::new(0x7E0)).wire(),
            "ATSH7E0"
        );
        assert_eq!(
            AdapterCommand::SetHeader(Header::new(0x18DAF110)).wire(),
            "ATSH18DAF110"
        );
        assert_eq!(
            AdapterCommand::CanReceiveArbitration(Header::new(0x7E8)).wire(),
            "ATCRA7E8"
        );
        assert_eq!(
            AdapterCommand::SetProtocol(BusProtocol::Can11Bit500k).wire(),
            "ATSP6"
        );
        assert_eq!(
            AdapterCommand::TryProtocol(BusProtocol::SaeJ1939).wire(),
            "ATTPA"
        );
        assert_eq!(AdapterCommand::SetTimeout(0xFF).wire(), "ATSTFF");
        assert_eq!(AdapterCommand::ReadVoltage.wire(), "ATRV");
        assert_eq!(AdapterCommand::UniCarScanIdentify.wire(), "AT#1");
    }

    #[test]
    fn data_wire_appends_expected_count_nibble() {
        let plain = AdapterCommand::Data {
            bytes: vec![0x22, 0xF1, 0x90],
            expected_responses: None,
        };
        assert_eq!(plain.wire(), "22F190");

        let counted = AdapterCommand::Data {
            bytes: vec![0x3E, 0x80],
            expected_responses: Some(0),
        };
        assert_eq!(counted.wire(), "3E800");
    }

    #[test]
    fn stpx_wire_and_termination() {
        let announce = AdapterCommand::StnTransmitAnnounce {
            header: Header::new(0x7E0),
            reply: Header::new(0x7E8),
            length: 10,
        };
        assert_eq!(announce.wire(), "STPXh:7E0,r:7E8,l:10");
        assert_eq!(announce.termination_override(), Some(b'\r'));
        assert_eq!(AdapterCommand::Reset.termination_override(), None);
    }

    #[test]
    fn normalization_failures() {
        let echo = AdapterCommand::Echo(false);
        assert_eq!(echo.parse("", 3), Err(Error::NoResponse));
        assert_eq!(echo.parse("?", 3), Err(Error::UnrecognizedCommand));
        assert!(matches!(
            echo.parse("CAN ERROR", 3),
            Err(Error::Bus(_))
        ));
        assert!(matches!(
            echo.parse("UNABLE TO CONNECT", 3),
            Err(Error::Bus(_))
        ));
        // The echoed command alone is no response either.
        assert_eq!(echo.parse("ATE0\r", 3), Err(Error::NoResponse));
    }

    #[test]
    fn acknowledgement_parsing() {
        let cmd = AdapterCommand::Spaces(false);
        assert_eq!(
            cmd.parse("OK\r", 3).unwrap(),
            CommandResponse::Acknowledged
        );
        assert!(matches!(
            cmd.parse("NO\r", 3),
            Err(Error::UnexpectedResult(_))
        ));
    }

    #[test]
    fn voltage_parsing() {
        assert_eq!(
            AdapterCommand::ReadVoltage.parse("12.6V", 3).unwrap(),
            CommandResponse::Voltage(12.6)
        );
        assert_eq!(
            AdapterCommand::ReadVoltage.parse("11.9", 3).unwrap(),
            CommandResponse::Voltage(11.9)
        );
        assert!(matches!(
            AdapterCommand::ReadVoltage.parse("LOW", 3),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn protocol_description_parsing() {
        assert_eq!(
            AdapterCommand::DescribeProtocolNumeric.parse("A6", 3).unwrap(),
            CommandResponse::Protocol(BusProtocol::Can11Bit500k)
        );
        assert_eq!(
            AdapterCommand::DescribeProtocolNumeric.parse("3", 3).unwrap(),
            CommandResponse::Protocol(BusProtocol::Iso9141_2)
        );
    }

    #[test]
    fn probe_drops_non_ecu_lines() {
        let raw = "SEARCHING...\r7E806410000000000\r";
        match AdapterCommand::ConnectProbe.parse(raw, 3).unwrap() {
            CommandResponse::Lines(lines) => {
                assert_eq!(lines, vec!["7E806410000000000".to_owned()]);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn data_lines_become_messages() {
        let cmd = AdapterCommand::Data {
            bytes: vec![0x22, 0xF1, 0x90],
            expected_responses: None,
        };
        let raw = "7E81014 62F19057\r7E8215646\r";
        match cmd.parse(raw, 3).unwrap() {
            CommandResponse::Messages(messages) => {
                assert_eq!(messages.len(), 2);
                assert_eq!(messages[0].id, Header::new(0x7E8));
                assert_eq!(messages[0].bytes, vec![0x10, 0x14, 0x62, 0xF1, 0x90, 0x57]);
                assert_eq!(messages[1].bytes, vec![0x21, 0x56, 0x46]);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn data_with_29_bit_headers() {
        let cmd = AdapterCommand::Data {
            bytes: vec![0x3E, 0x00],
            expected_responses: None,
        };
        let raw = "18DAF110037E00AAAA\r";
        match cmd.parse(raw, 8).unwrap() {
            CommandResponse::Messages(messages) => {
                assert_eq!(messages[0].id, Header::new(0x18DAF110));
                assert_eq!(messages[0].bytes, vec![0x03, 0x7E, 0x00, 0xAA, 0xAA]);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn data_no_hex_lines_is_no_response() {
        let cmd = AdapterCommand::Data {
            bytes: vec![0x01, 0x00],
            expected_responses: None,
        };
        assert_eq!(cmd.parse("NO DATA\r", 3), Err(Error::NoResponse));
    }

    #[test]
    fn stpx_expects_data_prompt() {
        let announce = AdapterCommand::StnTransmitAnnounce {
            header: Header::new(0x7E0),
            reply: Header::new(0x7E8),
            length: 12,
        };
        assert_eq!(
            announce.parse("DATA", 3).unwrap(),
            CommandResponse::Acknowledged
        );
        assert!(matches!(
            announce.parse("STOPPED", 3),
            Err(Error::UnexpectedResult(_))
        ));
    }
}
