//! Error types for CBUS frame parsing

use thiserror::Error;

/// Errors that can occur while parsing GridConnect data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Invalid frame structure
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A field that should be hexadecimal was not
    #[error("invalid hex in {field}: {value:?}")]
    InvalidHex {
        /// Which part of the frame was being parsed
        field: &'static str,
        /// The offending text
        value: String,
    },

    /// Standard frame without an opcode byte
    #[error("standard frame carries no opcode")]
    MissingOpcode,

    /// Fewer data bytes than the opcode requires
    #[error("opcode 0x{opcode:02X} needs {needed} data bytes, got {actual}")]
    Truncated {
        /// Opcode being decoded
        opcode: u8,
        /// Bytes the opcode requires
        needed: usize,
        /// Bytes present in the frame
        actual: usize,
    },

    /// Event name that is not exactly eight hex digits
    #[error("invalid event name: {0:?}")]
    InvalidEventName(String),
}
