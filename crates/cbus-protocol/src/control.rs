//! Bootloader control channel
//!
//! Extended frames carry the firmware bootloader protocol. Only the control
//! sub-commands are modelled; programming data is not.

use crate::gridconnect::Frame;

/// Extended identifier the bootloader answers on
pub const BOOT_RESPONSE_ID: u32 = 0x1000_0004;

/// Control sub-command, taken from the first payload byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// No operation
    Nop,
    /// Reset the node
    Reset,
    /// Reset the running checksum
    ResetChecksum,
    /// Verify the checksum and report
    CheckRun,
    /// Test for bootloader presence
    BootTest,
    /// Anything else
    Unknown(u8),
}

impl ControlCommand {
    /// Classify a control payload
    pub fn from_payload(data: &[u8]) -> Option<Self> {
        data.first().map(|&b| Self::from_u8(b))
    }

    /// Classify a sub-command byte
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Nop,
            1 => Self::Reset,
            2 => Self::ResetChecksum,
            3 => Self::CheckRun,
            4 => Self::BootTest,
            other => Self::Unknown(other),
        }
    }
}

/// Bootloader response codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BootResponse {
    /// Checksum or command failure
    Error = 0,
    /// Command accepted
    Ok = 1,
    /// Bootloader present and ready
    BootConfirmed = 2,
}

impl BootResponse {
    /// Frame carrying this response
    pub fn to_frame(self) -> Frame {
        Frame::extended(BOOT_RESPONSE_ID, vec![self as u8])
    }
}
