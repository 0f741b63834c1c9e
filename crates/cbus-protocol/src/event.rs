//! Event identifiers
//!
//! A CBUS event is named by a producer node number and an event number.
//! Short (device) events carry node number 0 and a device number instead.
//! On the wire and in stored-event tables the pair is rendered as eight
//! upper-case hex digits, node number first.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// A CBUS node number
pub type NodeNumber = u16;

/// Canonical event name: `(node number, event number)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventName {
    node_number: NodeNumber,
    event_number: u16,
}

impl EventName {
    /// Name of a long event produced by `node_number`
    pub const fn new(node_number: NodeNumber, event_number: u16) -> Self {
        Self {
            node_number,
            event_number,
        }
    }

    /// Name of a short (device-numbered) event
    pub const fn device(device_number: u16) -> Self {
        Self::new(0, device_number)
    }

    /// Node number half of the name
    pub fn node_number(&self) -> NodeNumber {
        self.node_number
    }

    /// Event (or device) number half of the name
    pub fn event_number(&self) -> u16 {
        self.event_number
    }

    /// Whether this names a short event
    pub fn is_device(&self) -> bool {
        self.node_number == 0
    }

    /// The four wire bytes, big-endian
    pub fn to_bytes(&self) -> [u8; 4] {
        let nn = self.node_number.to_be_bytes();
        let en = self.event_number.to_be_bytes();
        [nn[0], nn[1], en[0], en[1]]
    }

    /// Build from four wire bytes
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self::new(
            u16::from_be_bytes([bytes[0], bytes[1]]),
            u16::from_be_bytes([bytes[2], bytes[3]]),
        )
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}{:04X}", self.node_number, self.event_number)
    }
}

impl FromStr for EventName {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 8 {
            return Err(ParseError::InvalidEventName(s.to_string()));
        }
        let bytes = hex::decode(s).map_err(|_| ParseError::InvalidEventName(s.to_string()))?;
        Ok(Self::from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_zero_padded_upper_hex() {
        assert_eq!(EventName::new(1, 1).to_string(), "00010001");
        assert_eq!(EventName::new(300, 0xAB).to_string(), "012C00AB");
        assert_eq!(EventName::device(65535).to_string(), "0000FFFF");
    }

    #[test]
    fn test_parse() {
        let name: EventName = "012C00ab".parse().unwrap();
        assert_eq!(name, EventName::new(300, 0xAB));
        assert!(!name.is_device());
        assert!("0000000".parse::<EventName>().is_err());
        assert!("0000000G".parse::<EventName>().is_err());
    }

    #[test]
    fn test_bytes() {
        let name = EventName::new(0x1234, 0x5678);
        assert_eq!(name.to_bytes(), [0x12, 0x34, 0x56, 0x78]);
        assert_eq!(EventName::from_bytes(name.to_bytes()), name);
    }
}
