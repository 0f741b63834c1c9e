//! CBUS Protocol Library
//!
//! This crate provides parsing and encoding for CBUS, the model-railway
//! control bus, as carried over TCP by GridConnect-style gateways:
//!
//! - **GridConnect framing**: `:S` standard and `:X` extended ASCII frames
//! - **Opcode table**: mnemonics, payload lengths and transmit priorities
//! - **Messages**: structured decode/encode of every opcode's data bytes
//! - **Bootloader control**: the extended-frame control sub-commands
//!
//! # Example
//!
//! ```rust
//! use cbus_protocol::{CbusMessage, EncodeFrame, GridConnectCodec, ProtocolCodec};
//!
//! // Split a TCP read into frames and decode them
//! let mut codec = GridConnectCodec::new();
//! codec.push_bytes(b":SB780N9000010001;");
//!
//! let frame = codec.next_command().unwrap().unwrap();
//! assert_eq!(
//!     frame.message(),
//!     Some(&CbusMessage::Acon { node_number: 1, event_number: 1 })
//! );
//!
//! // Encode a message as the simulator would send it
//! let kloc = CbusMessage::Kloc { session: 1 };
//! assert_eq!(kloc.encode(), ":SA780N2101;");
//! ```

pub mod control;
pub mod error;
pub mod event;
pub mod gridconnect;
pub mod message;
pub mod opcode;

pub use control::{BootResponse, ControlCommand};
pub use error::ParseError;
pub use event::{EventName, NodeNumber};
pub use gridconnect::{Frame, GridConnectCodec, Header, SIMULATOR_CAN_ID};
pub use message::CbusMessage;
pub use opcode::Opcode;

/// Trait for protocol codecs that can parse incoming data streams
pub trait ProtocolCodec {
    /// The command type produced by this codec
    type Command;

    /// Push raw bytes into the codec's buffer
    fn push_bytes(&mut self, data: &[u8]);

    /// Try to extract the next complete command from the buffer
    fn next_command(&mut self) -> Option<Self::Command>;

    /// Try to extract the next complete command along with its raw bytes
    ///
    /// This is useful for traffic logging where we want to keep the exact
    /// text that was parsed for each frame.
    fn next_command_with_bytes(&mut self) -> Option<(Self::Command, Vec<u8>)>;

    /// Clear the internal buffer
    fn clear(&mut self);
}

/// Trait for frames and messages that can be encoded to GridConnect text
pub trait EncodeFrame {
    /// Encode to wire format, delimiters included
    fn encode(&self) -> String;
}
