//! CBUS opcode table
//!
//! The top three bits of every CBUS opcode give the number of data bytes
//! that follow it, so the payload length of an opcode is known even when the
//! opcode itself is not.

/// Number of data bytes carried by an opcode
pub const fn data_len(opcode: u8) -> usize {
    (opcode >> 5) as usize
}

/// Known CBUS opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Opcode {
    /// General acknowledgement
    Ack = 0x00,
    /// General no-ack
    Nak = 0x01,
    /// Bus halt
    Hlt = 0x02,
    /// Bus on
    Bon = 0x03,
    /// Track off
    Tof = 0x04,
    /// Track on
    Ton = 0x05,
    /// Emergency stop
    Estop = 0x06,
    /// System reset
    Arst = 0x07,
    /// Request track off
    Rtof = 0x08,
    /// Request track on
    Rton = 0x09,
    /// Request emergency stop all
    Restp = 0x0A,
    /// Request command station status
    Rstat = 0x0C,
    /// Query node number
    Qnn = 0x0D,
    /// Request node parameters
    Rqnp = 0x10,
    /// Request module name
    Rqmn = 0x11,
    /// Release engine (session)
    Kloc = 0x21,
    /// Query engine (session)
    Qloc = 0x22,
    /// Session keep-alive
    Dkeep = 0x23,
    /// Set node number
    Snn = 0x42,
    /// Request node number (module in setup)
    Rqnn = 0x50,
    /// Node number release
    Nnrel = 0x51,
    /// Node number acknowledge
    Nnack = 0x52,
    /// Put node into learn mode
    Nnlrn = 0x53,
    /// Release node from learn mode
    Nnuln = 0x54,
    /// Clear all events from a node
    Nnclr = 0x55,
    /// Read number of events available in a node
    Nnevn = 0x56,
    /// Read back all stored events
    Nerd = 0x57,
    /// Read number of stored events
    Rqevn = 0x58,
    /// Write acknowledge
    Wrack = 0x59,
    /// Request node data event
    Rqdat = 0x5A,
    /// Put node into bootload mode
    Bootm = 0x5C,
    /// Reset node
    Nnrst = 0x5E,
    /// Soft reset node
    Nnrsm = 0x5F,
    /// Command error
    Cmderr = 0x6F,
    /// Event space left
    Evnlf = 0x70,
    /// Read node variable
    Nvrd = 0x71,
    /// Read stored event by index
    Nenrd = 0x72,
    /// Read a single node parameter
    Rqnpn = 0x73,
    /// Number of stored events
    Numev = 0x74,
    /// Accessory on (long event)
    Acon = 0x90,
    /// Accessory off (long event)
    Acof = 0x91,
    /// Accessory request (long event)
    Areq = 0x92,
    /// Accessory response on
    Aron = 0x93,
    /// Accessory response off
    Arof = 0x94,
    /// Unlearn an event
    Evuln = 0x95,
    /// Set a node variable
    Nvset = 0x96,
    /// Node variable answer
    Nvans = 0x97,
    /// Accessory short on
    Ason = 0x98,
    /// Accessory short off
    Asof = 0x99,
    /// Accessory short request
    Asrq = 0x9A,
    /// Single node parameter response
    Paran = 0x9B,
    /// Read event variable by index
    Reval = 0x9C,
    /// Accessory short response on
    Arson = 0x9D,
    /// Accessory short response off
    Arsof = 0x9E,
    /// Read event variable by event name
    Reqev = 0xB2,
    /// Event variable response (by index)
    Neval = 0xB5,
    /// Response to QNN
    Pnn = 0xB6,
    /// Teach an event variable
    Evlrn = 0xD2,
    /// Event variable response (by name)
    Evans = 0xD3,
    /// Module name response
    Name = 0xE2,
    /// First seven node parameters
    Params = 0xEF,
    /// Stored event response
    Enrsp = 0xF2,
}

impl Opcode {
    /// Look up an opcode from its wire value
    pub fn from_u8(value: u8) -> Option<Self> {
        use Opcode::*;
        let op = match value {
            0x00 => Ack,
            0x01 => Nak,
            0x02 => Hlt,
            0x03 => Bon,
            0x04 => Tof,
            0x05 => Ton,
            0x06 => Estop,
            0x07 => Arst,
            0x08 => Rtof,
            0x09 => Rton,
            0x0A => Restp,
            0x0C => Rstat,
            0x0D => Qnn,
            0x10 => Rqnp,
            0x11 => Rqmn,
            0x21 => Kloc,
            0x22 => Qloc,
            0x23 => Dkeep,
            0x42 => Snn,
            0x50 => Rqnn,
            0x51 => Nnrel,
            0x52 => Nnack,
            0x53 => Nnlrn,
            0x54 => Nnuln,
            0x55 => Nnclr,
            0x56 => Nnevn,
            0x57 => Nerd,
            0x58 => Rqevn,
            0x59 => Wrack,
            0x5A => Rqdat,
            0x5C => Bootm,
            0x5E => Nnrst,
            0x5F => Nnrsm,
            0x6F => Cmderr,
            0x70 => Evnlf,
            0x71 => Nvrd,
            0x72 => Nenrd,
            0x73 => Rqnpn,
            0x74 => Numev,
            0x90 => Acon,
            0x91 => Acof,
            0x92 => Areq,
            0x93 => Aron,
            0x94 => Arof,
            0x95 => Evuln,
            0x96 => Nvset,
            0x97 => Nvans,
            0x98 => Ason,
            0x99 => Asof,
            0x9A => Asrq,
            0x9B => Paran,
            0x9C => Reval,
            0x9D => Arson,
            0x9E => Arsof,
            0xB2 => Reqev,
            0xB5 => Neval,
            0xB6 => Pnn,
            0xD2 => Evlrn,
            0xD3 => Evans,
            0xE2 => Name,
            0xEF => Params,
            0xF2 => Enrsp,
            _ => return None,
        };
        Some(op)
    }

    /// Wire value of this opcode
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Mnemonic used in the CBUS developer guide
    pub fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Ack => "ACK",
            Nak => "NAK",
            Hlt => "HLT",
            Bon => "BON",
            Tof => "TOF",
            Ton => "TON",
            Estop => "ESTOP",
            Arst => "ARST",
            Rtof => "RTOF",
            Rton => "RTON",
            Restp => "RESTP",
            Rstat => "RSTAT",
            Qnn => "QNN",
            Rqnp => "RQNP",
            Rqmn => "RQMN",
            Kloc => "KLOC",
            Qloc => "QLOC",
            Dkeep => "DKEEP",
            Snn => "SNN",
            Rqnn => "RQNN",
            Nnrel => "NNREL",
            Nnack => "NNACK",
            Nnlrn => "NNLRN",
            Nnuln => "NNULN",
            Nnclr => "NNCLR",
            Nnevn => "NNEVN",
            Nerd => "NERD",
            Rqevn => "RQEVN",
            Wrack => "WRACK",
            Rqdat => "RQDAT",
            Bootm => "BOOTM",
            Nnrst => "NNRST",
            Nnrsm => "NNRSM",
            Cmderr => "CMDERR",
            Evnlf => "EVNLF",
            Nvrd => "NVRD",
            Nenrd => "NENRD",
            Rqnpn => "RQNPN",
            Numev => "NUMEV",
            Acon => "ACON",
            Acof => "ACOF",
            Areq => "AREQ",
            Aron => "ARON",
            Arof => "AROF",
            Evuln => "EVULN",
            Nvset => "NVSET",
            Nvans => "NVANS",
            Ason => "ASON",
            Asof => "ASOF",
            Asrq => "ASRQ",
            Paran => "PARAN",
            Reval => "REVAL",
            Arson => "ARSON",
            Arsof => "ARSOF",
            Reqev => "REQEV",
            Neval => "NEVAL",
            Pnn => "PNN",
            Evlrn => "EVLRN",
            Evans => "EVANS",
            Name => "NAME",
            Params => "PARAMS",
            Enrsp => "ENRSP",
        }
    }

    /// Default minor priority used when this opcode is transmitted
    ///
    /// 0 is the highest priority. Bus-critical opcodes go out ahead of
    /// cab/session traffic, which in turn goes ahead of configuration and
    /// accessory traffic.
    pub fn minor_priority(self) -> u8 {
        use Opcode::*;
        match self {
            Hlt | Arst | Restp => 0,
            Bon | Tof | Ton | Estop | Rtof | Rton => 1,
            Ack | Nak | Rstat | Rqmn | Kloc | Qloc | Dkeep => 2,
            _ => 3,
        }
    }

    /// Number of data bytes following this opcode
    pub fn data_len(self) -> usize {
        data_len(self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u8_matches_discriminant() {
        for value in 0..=u8::MAX {
            if let Some(op) = Opcode::from_u8(value) {
                assert_eq!(op.as_u8(), value, "{} maps back", op.name());
            }
        }
    }

    #[test]
    fn test_unassigned_opcode() {
        assert_eq!(Opcode::from_u8(0x0B), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_data_len_from_top_bits() {
        assert_eq!(Opcode::Qnn.data_len(), 0);
        assert_eq!(Opcode::Kloc.data_len(), 1);
        assert_eq!(Opcode::Rqnn.data_len(), 2);
        assert_eq!(Opcode::Cmderr.data_len(), 3);
        assert_eq!(Opcode::Acon.data_len(), 4);
        assert_eq!(Opcode::Reqev.data_len(), 5);
        assert_eq!(Opcode::Evlrn.data_len(), 6);
        assert_eq!(Opcode::Params.data_len(), 7);
    }

    #[test]
    fn test_priorities() {
        assert_eq!(Opcode::Kloc.minor_priority(), 2);
        assert_eq!(Opcode::Cmderr.minor_priority(), 3);
        assert_eq!(Opcode::Hlt.minor_priority(), 0);
        assert_eq!(Opcode::Estop.minor_priority(), 1);
    }
}
