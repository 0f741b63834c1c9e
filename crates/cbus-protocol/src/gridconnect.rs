//! GridConnect ASCII framing
//!
//! CBUS gateways carry CAN frames over TCP as ASCII text.
//!
//! # Format
//! - Standard: `:S` `hhhh` `N` `oo` `dd...` `;`
//!   where `hhhh` is the 16-bit SIDH/SIDL header, `oo` the opcode and `dd`
//!   the opcode's data bytes
//! - Extended: `:X` `iiiiiiii` `N` `dd...` `;`
//!   where `iiiiiiii` is the 32-bit extended identifier
//!
//! All numeric fields are upper-case hex on output; input is accepted in
//! either case.

use std::fmt;

use crate::error::ParseError;
use crate::message::CbusMessage;
use crate::{EncodeFrame, ProtocolCodec};

/// CAN id the simulator transmits with
pub const SIMULATOR_CAN_ID: u8 = 60;

/// Major priority used for all simulator traffic
pub const DEFAULT_MAJOR_PRIORITY: u8 = 2;

/// Bytes buffered without a terminator before the buffer is discarded
const MAX_FRAME_LEN: usize = 64;

/// Standard frame header (11-bit CAN identifier)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header {
    /// Major priority (2 bits)
    pub major_priority: u8,
    /// Minor priority (2 bits)
    pub minor_priority: u8,
    /// CAN id (7 bits)
    pub can_id: u8,
}

impl Header {
    /// Header for a message sent by `can_id` at the opcode's default priority
    pub fn for_message(message: &CbusMessage, can_id: u8) -> Self {
        let minor_priority = message
            .opcode()
            .map(|op| op.minor_priority())
            .unwrap_or(3);
        Self {
            major_priority: DEFAULT_MAJOR_PRIORITY,
            minor_priority,
            can_id,
        }
    }

    /// Pack into the 16-bit SIDH/SIDL form used by GridConnect
    pub fn to_u16(self) -> u16 {
        ((self.major_priority as u16 & 0x3) << 14)
            | ((self.minor_priority as u16 & 0x3) << 12)
            | ((self.can_id as u16 & 0x7F) << 5)
    }

    /// Unpack from the 16-bit SIDH/SIDL form
    pub fn from_u16(raw: u16) -> Self {
        Self {
            major_priority: ((raw >> 14) & 0x3) as u8,
            minor_priority: ((raw >> 12) & 0x3) as u8,
            can_id: ((raw >> 5) & 0x7F) as u8,
        }
    }
}

/// A single GridConnect frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Opcode-addressed CBUS message
    Standard {
        /// CAN header
        header: Header,
        /// Decoded message
        message: CbusMessage,
    },
    /// 29-bit identifier frame (bootloader / control channel)
    Extended {
        /// Extended CAN identifier
        identifier: u32,
        /// Raw payload
        data: Vec<u8>,
    },
}

impl Frame {
    /// Wrap a message in a standard frame sent by the simulator
    pub fn standard(message: CbusMessage) -> Self {
        Self::from_can_id(message, SIMULATOR_CAN_ID)
    }

    /// Wrap a message in a standard frame sent by `can_id`
    pub fn from_can_id(message: CbusMessage, can_id: u8) -> Self {
        Self::Standard {
            header: Header::for_message(&message, can_id),
            message,
        }
    }

    /// Build an extended frame
    pub fn extended(identifier: u32, data: Vec<u8>) -> Self {
        Self::Extended { identifier, data }
    }

    /// The decoded message of a standard frame
    pub fn message(&self) -> Option<&CbusMessage> {
        match self {
            Self::Standard { message, .. } => Some(message),
            Self::Extended { .. } => None,
        }
    }

    /// Parse one complete frame, including the `:` and `;` delimiters
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let text = text.trim();
        let body = text
            .strip_prefix(':')
            .and_then(|t| t.strip_suffix(';'))
            .ok_or_else(|| ParseError::InvalidFrame(format!("missing delimiters: {:?}", text)))?;

        let (kind, rest) = body.split_at(body.chars().next().map_or(0, char::len_utf8));
        let (id_text, payload) = rest
            .split_once('N')
            .ok_or_else(|| ParseError::InvalidFrame(format!("no data marker: {:?}", text)))?;
        let payload = decode_hex("payload", payload)?;

        match kind {
            "S" => {
                if id_text.len() != 4 {
                    return Err(ParseError::InvalidFrame(format!(
                        "standard header must be 4 hex digits: {:?}",
                        id_text
                    )));
                }
                let raw = u16::from_str_radix(id_text, 16).map_err(|_| ParseError::InvalidHex {
                    field: "header",
                    value: id_text.to_string(),
                })?;
                let (&opcode, data) = payload.split_first().ok_or(ParseError::MissingOpcode)?;
                Ok(Self::Standard {
                    header: Header::from_u16(raw),
                    message: CbusMessage::decode(opcode, data)?,
                })
            }
            "X" => {
                if id_text.len() != 8 {
                    return Err(ParseError::InvalidFrame(format!(
                        "extended identifier must be 8 hex digits: {:?}",
                        id_text
                    )));
                }
                let identifier =
                    u32::from_str_radix(id_text, 16).map_err(|_| ParseError::InvalidHex {
                        field: "identifier",
                        value: id_text.to_string(),
                    })?;
                Ok(Self::Extended {
                    identifier,
                    data: payload,
                })
            }
            other => Err(ParseError::InvalidFrame(format!(
                "unknown frame type {:?}",
                other
            ))),
        }
    }
}

impl EncodeFrame for Frame {
    fn encode(&self) -> String {
        match self {
            Self::Standard { header, message } => format!(
                ":S{:04X}N{:02X}{};",
                header.to_u16(),
                message.opcode_byte(),
                hex::encode_upper(message.data())
            ),
            Self::Extended { identifier, data } => {
                format!(":X{:08X}N{};", identifier, hex::encode_upper(data))
            }
        }
    }
}

impl EncodeFrame for CbusMessage {
    fn encode(&self) -> String {
        Frame::standard(self.clone()).encode()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn decode_hex(field: &'static str, text: &str) -> Result<Vec<u8>, ParseError> {
    hex::decode(text).map_err(|_| ParseError::InvalidHex {
        field,
        value: text.to_string(),
    })
}

/// Streaming GridConnect splitter
///
/// Accumulates bytes from a TCP stream and yields each `;`-terminated frame
/// with its terminator restored. Whitespace between frames is dropped, and
/// bytes before a frame's opening `:` are skipped.
pub struct GridConnectCodec {
    buffer: Vec<u8>,
}

impl GridConnectCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_FRAME_LEN),
        }
    }

    /// Take the next complete frame text from the buffer
    pub fn next_frame_text(&mut self) -> Option<String> {
        loop {
            let term_pos = self.buffer.iter().position(|&b| b == b';')?;
            let piece: Vec<u8> = self.buffer.drain(..=term_pos).collect();
            // A frame starts at its last ':'; anything before it is noise
            let start = piece.iter().rposition(|&b| b == b':').unwrap_or(0);
            if start > 0 {
                tracing::debug!("Skipping {} bytes of noise before frame", start);
            }
            let text = String::from_utf8_lossy(&piece[start..]);
            let text = text.trim_start();
            if text == ";" {
                continue;
            }
            return Some(text.to_string());
        }
    }
}

impl Default for GridConnectCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolCodec for GridConnectCodec {
    type Command = Result<Frame, ParseError>;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // A run this long without a terminator is line noise, not a frame
        if !self.buffer.contains(&b';') && self.buffer.len() > MAX_FRAME_LEN * 4 {
            tracing::warn!(
                "Discarding {} unterminated GridConnect bytes",
                self.buffer.len()
            );
            self.buffer.clear();
        }
    }

    fn next_command(&mut self) -> Option<Self::Command> {
        self.next_command_with_bytes().map(|(cmd, _)| cmd)
    }

    fn next_command_with_bytes(&mut self) -> Option<(Self::Command, Vec<u8>)> {
        let text = self.next_frame_text()?;
        let frame = Frame::parse(&text);
        if let Err(e) = &frame {
            tracing::warn!("Failed to parse GridConnect frame {:?}: {}", text, e);
        }
        Some((frame, text.into_bytes()))
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventName;

    #[test]
    fn test_encode_kloc() {
        let frame = Frame::standard(CbusMessage::Kloc { session: 1 });
        assert_eq!(frame.encode(), ":SA780N2101;");
    }

    #[test]
    fn test_encode_node_messages() {
        assert_eq!(
            CbusMessage::Rqnn { node_number: 1 }.encode(),
            ":SB780N500001;"
        );
        assert_eq!(
            CbusMessage::Nnack { node_number: 1 }.encode(),
            ":SB780N520001;"
        );
        assert_eq!(
            CbusMessage::Cmderr {
                node_number: 1,
                error: 10
            }
            .encode(),
            ":SB780N6F00010A;"
        );
        assert_eq!(
            CbusMessage::Acon {
                node_number: 1,
                event_number: 1
            }
            .encode(),
            ":SB780N9000010001;"
        );
    }

    #[test]
    fn test_header_packing() {
        let header = Header::from_u16(0xB780);
        assert_eq!(header.major_priority, 2);
        assert_eq!(header.minor_priority, 3);
        assert_eq!(header.can_id, 60);
        assert_eq!(header.to_u16(), 0xB780);
    }

    #[test]
    fn test_parse_standard() {
        let frame = Frame::parse(":SB780N9000010002;").unwrap();
        assert_eq!(
            frame.message(),
            Some(&CbusMessage::Acon {
                node_number: 1,
                event_number: 2
            })
        );
    }

    #[test]
    fn test_parse_lowercase_and_other_can_id() {
        let frame = Frame::parse(":sb020n0d;");
        assert!(frame.is_err(), "frame type letter is case sensitive");

        let frame = Frame::parse(":SB020N0d;").unwrap();
        match frame {
            Frame::Standard { header, message } => {
                assert_eq!(header.can_id, 1);
                assert_eq!(message, CbusMessage::Qnn);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_parse_extended() {
        let frame = Frame::parse(":X00080004N0300000000000000;").unwrap();
        assert_eq!(
            frame,
            Frame::Extended {
                identifier: 0x0008_0004,
                data: vec![3, 0, 0, 0, 0, 0, 0, 0],
            }
        );
        assert_eq!(frame.encode(), ":X00080004N0300000000000000;");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Frame::parse("SB780N0D;"),
            Err(ParseError::InvalidFrame(_))
        ));
        assert!(matches!(
            Frame::parse(":SB780;"),
            Err(ParseError::InvalidFrame(_))
        ));
        assert!(matches!(
            Frame::parse(":SB780N;"),
            Err(ParseError::MissingOpcode)
        ));
        assert!(matches!(
            Frame::parse(":SB780N9000;"),
            Err(ParseError::Truncated { .. })
        ));
        assert!(matches!(
            Frame::parse(":SB780N0Z;"),
            Err(ParseError::InvalidHex { .. })
        ));
        assert!(matches!(
            Frame::parse(":Q00000000N00;"),
            Err(ParseError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_enrsp_frame() {
        let frame = Frame::standard(CbusMessage::Enrsp {
            node_number: 300,
            event: EventName::new(1, 2),
            event_index: 0,
        });
        assert_eq!(frame.encode(), ":SB780NF2012C0001000200;");
    }

    #[test]
    fn test_codec_splits_concatenated_frames() {
        let mut codec = GridConnectCodec::new();
        codec.push_bytes(b":SB780N0D;:SB780N10;");

        assert_eq!(codec.next_frame_text().as_deref(), Some(":SB780N0D;"));
        assert_eq!(codec.next_frame_text().as_deref(), Some(":SB780N10;"));
        assert_eq!(codec.next_frame_text(), None);
    }

    #[test]
    fn test_codec_streaming() {
        let mut codec = GridConnectCodec::new();
        codec.push_bytes(b":SB780N90000");
        assert!(codec.next_command().is_none());

        codec.push_bytes(b"10001;\r\n");
        let frame = codec.next_command().unwrap().unwrap();
        assert_eq!(
            frame.message(),
            Some(&CbusMessage::Acon {
                node_number: 1,
                event_number: 1
            })
        );
    }

    #[test]
    fn test_codec_skips_whitespace_and_empty_pieces() {
        let mut codec = GridConnectCodec::new();
        codec.push_bytes(b"\n;:SB780N0D;");
        assert_eq!(codec.next_frame_text().as_deref(), Some(":SB780N0D;"));
    }

    #[test]
    fn test_codec_reports_bad_frames() {
        let mut codec = GridConnectCodec::new();
        codec.push_bytes(b"garbage;:SB780N0D;");

        let (bad, raw) = codec.next_command_with_bytes().unwrap();
        assert!(bad.is_err());
        assert_eq!(raw, b"garbage;");
        assert!(codec.next_command().unwrap().is_ok());
    }

    #[test]
    fn test_codec_resyncs_on_frame_start() {
        let mut codec = GridConnectCodec::new();
        codec.push_bytes(b"AAAA:SB780N0D;");
        assert_eq!(codec.next_frame_text().as_deref(), Some(":SB780N0D;"));

        codec.push_bytes(b":SB78:SB780N10;");
        let frame = codec.next_command().unwrap().unwrap();
        assert_eq!(frame.message(), Some(&CbusMessage::Rqnp));
    }

    #[test]
    fn test_codec_discards_runaway_buffer() {
        let mut codec = GridConnectCodec::new();
        codec.push_bytes(&[b'A'; 300]);
        codec.push_bytes(b":SB780N0D;");
        assert_eq!(codec.next_frame_text().as_deref(), Some(":SB780N0D;"));
    }
}
