//! Structured CBUS messages
//!
//! [`CbusMessage`] is the decoded form of a standard frame's opcode and data
//! bytes. Multi-byte fields are big-endian on the wire. Opcodes that are not
//! in the [`Opcode`] table decode to [`CbusMessage::Unknown`] so that the
//! raw bytes survive for logging.

use std::fmt;

use crate::error::ParseError;
use crate::event::{EventName, NodeNumber};
use crate::opcode::{data_len, Opcode};

/// A decoded CBUS standard-frame message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CbusMessage {
    /// General acknowledgement
    Ack,
    /// General no-ack
    Nak,
    /// Bus halt
    Hlt,
    /// Bus on
    Bon,
    /// Track off
    Tof,
    /// Track on
    Ton,
    /// Emergency stop
    Estop,
    /// System reset
    Arst,
    /// Request track off
    Rtof,
    /// Request track on
    Rton,
    /// Request emergency stop all
    Restp,
    /// Request command station status
    Rstat,
    /// Query all node numbers
    Qnn,
    /// Request node parameters (module in setup)
    Rqnp,
    /// Request module name (module in setup)
    Rqmn,

    /// Release engine session
    Kloc { session: u8 },
    /// Query engine session
    Qloc { session: u8 },
    /// Session keep-alive
    Dkeep { session: u8 },

    /// Set node number
    Snn { node_number: NodeNumber },
    /// Module in setup requests a node number
    Rqnn { node_number: NodeNumber },
    /// Node number released
    Nnrel { node_number: NodeNumber },
    /// Node number acknowledged
    Nnack { node_number: NodeNumber },
    /// Enter learn mode
    Nnlrn { node_number: NodeNumber },
    /// Leave learn mode
    Nnuln { node_number: NodeNumber },
    /// Clear all stored events
    Nnclr { node_number: NodeNumber },
    /// Request free event space
    Nnevn { node_number: NodeNumber },
    /// Read back all stored events
    Nerd { node_number: NodeNumber },
    /// Request number of stored events
    Rqevn { node_number: NodeNumber },
    /// Write acknowledge
    Wrack { node_number: NodeNumber },
    /// Request node data event
    Rqdat { node_number: NodeNumber },
    /// Enter bootload mode
    Bootm { node_number: NodeNumber },
    /// Reset node
    Nnrst { node_number: NodeNumber },
    /// Soft reset node
    Nnrsm { node_number: NodeNumber },

    /// Command error
    Cmderr { node_number: NodeNumber, error: u8 },
    /// Event space left
    Evnlf { node_number: NodeNumber, space: u8 },
    /// Read a node variable
    Nvrd { node_number: NodeNumber, nv_index: u8 },
    /// Read a stored event by index
    Nenrd { node_number: NodeNumber, event_index: u8 },
    /// Read a node parameter
    Rqnpn { node_number: NodeNumber, param_index: u8 },
    /// Number of stored events
    Numev { node_number: NodeNumber, count: u8 },

    /// Accessory on (long event)
    Acon { node_number: NodeNumber, event_number: u16 },
    /// Accessory off (long event)
    Acof { node_number: NodeNumber, event_number: u16 },
    /// Accessory state request (long event)
    Areq { node_number: NodeNumber, event_number: u16 },
    /// Accessory response: on
    Aron { node_number: NodeNumber, event_number: u16 },
    /// Accessory response: off
    Arof { node_number: NodeNumber, event_number: u16 },
    /// Unlearn an event
    Evuln { node_number: NodeNumber, event_number: u16 },
    /// Set a node variable
    Nvset { node_number: NodeNumber, nv_index: u8, nv_value: u8 },
    /// Node variable answer
    Nvans { node_number: NodeNumber, nv_index: u8, nv_value: u8 },
    /// Accessory short on
    Ason { node_number: NodeNumber, device_number: u16 },
    /// Accessory short off
    Asof { node_number: NodeNumber, device_number: u16 },
    /// Accessory short request
    Asrq { node_number: NodeNumber, device_number: u16 },
    /// Accessory short response: on
    Arson { node_number: NodeNumber, device_number: u16 },
    /// Accessory short response: off
    Arsof { node_number: NodeNumber, device_number: u16 },
    /// Single node parameter
    Paran { node_number: NodeNumber, param_index: u8, param_value: u8 },
    /// Read an event variable by event index
    Reval { node_number: NodeNumber, event_index: u8, ev_index: u8 },

    /// Read an event variable by event name
    Reqev { node_number: NodeNumber, event_number: u16, ev_index: u8 },
    /// Event variable answer (by event index)
    Neval { node_number: NodeNumber, event_index: u8, ev_index: u8, ev_value: u8 },
    /// Node present (response to QNN)
    Pnn { node_number: NodeNumber, manufacturer_id: u8, module_id: u8, flags: u8 },

    /// Teach an event variable
    Evlrn { node_number: NodeNumber, event_number: u16, ev_index: u8, ev_value: u8 },
    /// Event variable answer (by event name)
    Evans { node_number: NodeNumber, event_number: u16, ev_index: u8, ev_value: u8 },

    /// Seven-character module name, space padded
    Name { name: [u8; 7] },
    /// Node parameters 1 to 7
    Params { params: [u8; 7] },
    /// Stored event and its index
    Enrsp { node_number: NodeNumber, event: EventName, event_index: u8 },

    /// Opcode not in the table; data preserved
    Unknown { opcode: u8, data: Vec<u8> },
}

impl CbusMessage {
    /// Decode an opcode and its data bytes
    ///
    /// Bytes beyond the opcode's fixed payload length are ignored.
    pub fn decode(opcode: u8, data: &[u8]) -> Result<Self, ParseError> {
        let needed = data_len(opcode);
        if data.len() < needed {
            return Err(ParseError::Truncated {
                opcode,
                needed,
                actual: data.len(),
            });
        }
        let d = &data[..needed];

        let Some(op) = Opcode::from_u8(opcode) else {
            return Ok(Self::Unknown {
                opcode,
                data: d.to_vec(),
            });
        };

        let word = |i: usize| u16::from_be_bytes([d[i], d[i + 1]]);

        let msg = match op {
            Opcode::Ack => Self::Ack,
            Opcode::Nak => Self::Nak,
            Opcode::Hlt => Self::Hlt,
            Opcode::Bon => Self::Bon,
            Opcode::Tof => Self::Tof,
            Opcode::Ton => Self::Ton,
            Opcode::Estop => Self::Estop,
            Opcode::Arst => Self::Arst,
            Opcode::Rtof => Self::Rtof,
            Opcode::Rton => Self::Rton,
            Opcode::Restp => Self::Restp,
            Opcode::Rstat => Self::Rstat,
            Opcode::Qnn => Self::Qnn,
            Opcode::Rqnp => Self::Rqnp,
            Opcode::Rqmn => Self::Rqmn,

            Opcode::Kloc => Self::Kloc { session: d[0] },
            Opcode::Qloc => Self::Qloc { session: d[0] },
            Opcode::Dkeep => Self::Dkeep { session: d[0] },

            Opcode::Snn => Self::Snn { node_number: word(0) },
            Opcode::Rqnn => Self::Rqnn { node_number: word(0) },
            Opcode::Nnrel => Self::Nnrel { node_number: word(0) },
            Opcode::Nnack => Self::Nnack { node_number: word(0) },
            Opcode::Nnlrn => Self::Nnlrn { node_number: word(0) },
            Opcode::Nnuln => Self::Nnuln { node_number: word(0) },
            Opcode::Nnclr => Self::Nnclr { node_number: word(0) },
            Opcode::Nnevn => Self::Nnevn { node_number: word(0) },
            Opcode::Nerd => Self::Nerd { node_number: word(0) },
            Opcode::Rqevn => Self::Rqevn { node_number: word(0) },
            Opcode::Wrack => Self::Wrack { node_number: word(0) },
            Opcode::Rqdat => Self::Rqdat { node_number: word(0) },
            Opcode::Bootm => Self::Bootm { node_number: word(0) },
            Opcode::Nnrst => Self::Nnrst { node_number: word(0) },
            Opcode::Nnrsm => Self::Nnrsm { node_number: word(0) },

            Opcode::Cmderr => Self::Cmderr { node_number: word(0), error: d[2] },
            Opcode::Evnlf => Self::Evnlf { node_number: word(0), space: d[2] },
            Opcode::Nvrd => Self::Nvrd { node_number: word(0), nv_index: d[2] },
            Opcode::Nenrd => Self::Nenrd { node_number: word(0), event_index: d[2] },
            Opcode::Rqnpn => Self::Rqnpn { node_number: word(0), param_index: d[2] },
            Opcode::Numev => Self::Numev { node_number: word(0), count: d[2] },

            Opcode::Acon => Self::Acon { node_number: word(0), event_number: word(2) },
            Opcode::Acof => Self::Acof { node_number: word(0), event_number: word(2) },
            Opcode::Areq => Self::Areq { node_number: word(0), event_number: word(2) },
            Opcode::Aron => Self::Aron { node_number: word(0), event_number: word(2) },
            Opcode::Arof => Self::Arof { node_number: word(0), event_number: word(2) },
            Opcode::Evuln => Self::Evuln { node_number: word(0), event_number: word(2) },
            Opcode::Nvset => Self::Nvset {
                node_number: word(0),
                nv_index: d[2],
                nv_value: d[3],
            },
            Opcode::Nvans => Self::Nvans {
                node_number: word(0),
                nv_index: d[2],
                nv_value: d[3],
            },
            Opcode::Ason => Self::Ason { node_number: word(0), device_number: word(2) },
            Opcode::Asof => Self::Asof { node_number: word(0), device_number: word(2) },
            Opcode::Asrq => Self::Asrq { node_number: word(0), device_number: word(2) },
            Opcode::Arson => Self::Arson { node_number: word(0), device_number: word(2) },
            Opcode::Arsof => Self::Arsof { node_number: word(0), device_number: word(2) },
            Opcode::Paran => Self::Paran {
                node_number: word(0),
                param_index: d[2],
                param_value: d[3],
            },
            Opcode::Reval => Self::Reval {
                node_number: word(0),
                event_index: d[2],
                ev_index: d[3],
            },

            Opcode::Reqev => Self::Reqev {
                node_number: word(0),
                event_number: word(2),
                ev_index: d[4],
            },
            Opcode::Neval => Self::Neval {
                node_number: word(0),
                event_index: d[2],
                ev_index: d[3],
                ev_value: d[4],
            },
            Opcode::Pnn => Self::Pnn {
                node_number: word(0),
                manufacturer_id: d[2],
                module_id: d[3],
                flags: d[4],
            },

            Opcode::Evlrn => Self::Evlrn {
                node_number: word(0),
                event_number: word(2),
                ev_index: d[4],
                ev_value: d[5],
            },
            Opcode::Evans => Self::Evans {
                node_number: word(0),
                event_number: word(2),
                ev_index: d[4],
                ev_value: d[5],
            },

            Opcode::Name => {
                let mut name = [0u8; 7];
                name.copy_from_slice(d);
                Self::Name { name }
            }
            Opcode::Params => {
                let mut params = [0u8; 7];
                params.copy_from_slice(d);
                Self::Params { params }
            }
            Opcode::Enrsp => Self::Enrsp {
                node_number: word(0),
                event: EventName::from_bytes([d[2], d[3], d[4], d[5]]),
                event_index: d[6],
            },
        };

        Ok(msg)
    }

    /// The opcode, if it is one the table knows
    pub fn opcode(&self) -> Option<Opcode> {
        let op = match self {
            Self::Ack => Opcode::Ack,
            Self::Nak => Opcode::Nak,
            Self::Hlt => Opcode::Hlt,
            Self::Bon => Opcode::Bon,
            Self::Tof => Opcode::Tof,
            Self::Ton => Opcode::Ton,
            Self::Estop => Opcode::Estop,
            Self::Arst => Opcode::Arst,
            Self::Rtof => Opcode::Rtof,
            Self::Rton => Opcode::Rton,
            Self::Restp => Opcode::Restp,
            Self::Rstat => Opcode::Rstat,
            Self::Qnn => Opcode::Qnn,
            Self::Rqnp => Opcode::Rqnp,
            Self::Rqmn => Opcode::Rqmn,
            Self::Kloc { .. } => Opcode::Kloc,
            Self::Qloc { .. } => Opcode::Qloc,
            Self::Dkeep { .. } => Opcode::Dkeep,
            Self::Snn { .. } => Opcode::Snn,
            Self::Rqnn { .. } => Opcode::Rqnn,
            Self::Nnrel { .. } => Opcode::Nnrel,
            Self::Nnack { .. } => Opcode::Nnack,
            Self::Nnlrn { .. } => Opcode::Nnlrn,
            Self::Nnuln { .. } => Opcode::Nnuln,
            Self::Nnclr { .. } => Opcode::Nnclr,
            Self::Nnevn { .. } => Opcode::Nnevn,
            Self::Nerd { .. } => Opcode::Nerd,
            Self::Rqevn { .. } => Opcode::Rqevn,
            Self::Wrack { .. } => Opcode::Wrack,
            Self::Rqdat { .. } => Opcode::Rqdat,
            Self::Bootm { .. } => Opcode::Bootm,
            Self::Nnrst { .. } => Opcode::Nnrst,
            Self::Nnrsm { .. } => Opcode::Nnrsm,
            Self::Cmderr { .. } => Opcode::Cmderr,
            Self::Evnlf { .. } => Opcode::Evnlf,
            Self::Nvrd { .. } => Opcode::Nvrd,
            Self::Nenrd { .. } => Opcode::Nenrd,
            Self::Rqnpn { .. } => Opcode::Rqnpn,
            Self::Numev { .. } => Opcode::Numev,
            Self::Acon { .. } => Opcode::Acon,
            Self::Acof { .. } => Opcode::Acof,
            Self::Areq { .. } => Opcode::Areq,
            Self::Aron { .. } => Opcode::Aron,
            Self::Arof { .. } => Opcode::Arof,
            Self::Evuln { .. } => Opcode::Evuln,
            Self::Nvset { .. } => Opcode::Nvset,
            Self::Nvans { .. } => Opcode::Nvans,
            Self::Ason { .. } => Opcode::Ason,
            Self::Asof { .. } => Opcode::Asof,
            Self::Asrq { .. } => Opcode::Asrq,
            Self::Arson { .. } => Opcode::Arson,
            Self::Arsof { .. } => Opcode::Arsof,
            Self::Paran { .. } => Opcode::Paran,
            Self::Reval { .. } => Opcode::Reval,
            Self::Reqev { .. } => Opcode::Reqev,
            Self::Neval { .. } => Opcode::Neval,
            Self::Pnn { .. } => Opcode::Pnn,
            Self::Evlrn { .. } => Opcode::Evlrn,
            Self::Evans { .. } => Opcode::Evans,
            Self::Name { .. } => Opcode::Name,
            Self::Params { .. } => Opcode::Params,
            Self::Enrsp { .. } => Opcode::Enrsp,
            Self::Unknown { .. } => return None,
        };
        Some(op)
    }

    /// Raw opcode byte
    pub fn opcode_byte(&self) -> u8 {
        match self {
            Self::Unknown { opcode, .. } => *opcode,
            other => other.opcode().map(Opcode::as_u8).unwrap_or_default(),
        }
    }

    /// Mnemonic for logging
    pub fn name(&self) -> &'static str {
        self.opcode().map(Opcode::name).unwrap_or("UNKNOWN")
    }

    /// Node number carried in the first two data bytes, if the opcode has one
    pub fn node_number(&self) -> Option<NodeNumber> {
        match self {
            Self::Snn { node_number }
            | Self::Rqnn { node_number }
            | Self::Nnrel { node_number }
            | Self::Nnack { node_number }
            | Self::Nnlrn { node_number }
            | Self::Nnuln { node_number }
            | Self::Nnclr { node_number }
            | Self::Nnevn { node_number }
            | Self::Nerd { node_number }
            | Self::Rqevn { node_number }
            | Self::Wrack { node_number }
            | Self::Rqdat { node_number }
            | Self::Bootm { node_number }
            | Self::Nnrst { node_number }
            | Self::Nnrsm { node_number }
            | Self::Cmderr { node_number, .. }
            | Self::Evnlf { node_number, .. }
            | Self::Nvrd { node_number, .. }
            | Self::Nenrd { node_number, .. }
            | Self::Rqnpn { node_number, .. }
            | Self::Numev { node_number, .. }
            | Self::Acon { node_number, .. }
            | Self::Acof { node_number, .. }
            | Self::Areq { node_number, .. }
            | Self::Aron { node_number, .. }
            | Self::Arof { node_number, .. }
            | Self::Evuln { node_number, .. }
            | Self::Nvset { node_number, .. }
            | Self::Nvans { node_number, .. }
            | Self::Ason { node_number, .. }
            | Self::Asof { node_number, .. }
            | Self::Asrq { node_number, .. }
            | Self::Arson { node_number, .. }
            | Self::Arsof { node_number, .. }
            | Self::Paran { node_number, .. }
            | Self::Reval { node_number, .. }
            | Self::Reqev { node_number, .. }
            | Self::Neval { node_number, .. }
            | Self::Pnn { node_number, .. }
            | Self::Evlrn { node_number, .. }
            | Self::Evans { node_number, .. }
            | Self::Enrsp { node_number, .. } => Some(*node_number),
            _ => None,
        }
    }

    /// Data bytes following the opcode
    pub fn data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(7);
        match self {
            Self::Ack
            | Self::Nak
            | Self::Hlt
            | Self::Bon
            | Self::Tof
            | Self::Ton
            | Self::Estop
            | Self::Arst
            | Self::Rtof
            | Self::Rton
            | Self::Restp
            | Self::Rstat
            | Self::Qnn
            | Self::Rqnp
            | Self::Rqmn => {}

            Self::Kloc { session } | Self::Qloc { session } | Self::Dkeep { session } => {
                out.push(*session)
            }

            Self::Snn { node_number }
            | Self::Rqnn { node_number }
            | Self::Nnrel { node_number }
            | Self::Nnack { node_number }
            | Self::Nnlrn { node_number }
            | Self::Nnuln { node_number }
            | Self::Nnclr { node_number }
            | Self::Nnevn { node_number }
            | Self::Nerd { node_number }
            | Self::Rqevn { node_number }
            | Self::Wrack { node_number }
            | Self::Rqdat { node_number }
            | Self::Bootm { node_number }
            | Self::Nnrst { node_number }
            | Self::Nnrsm { node_number } => out.extend(node_number.to_be_bytes()),

            Self::Cmderr { node_number, error: b }
            | Self::Evnlf { node_number, space: b }
            | Self::Nvrd { node_number, nv_index: b }
            | Self::Nenrd { node_number, event_index: b }
            | Self::Rqnpn { node_number, param_index: b }
            | Self::Numev { node_number, count: b } => {
                out.extend(node_number.to_be_bytes());
                out.push(*b);
            }

            Self::Acon { node_number, event_number: w }
            | Self::Acof { node_number, event_number: w }
            | Self::Areq { node_number, event_number: w }
            | Self::Aron { node_number, event_number: w }
            | Self::Arof { node_number, event_number: w }
            | Self::Evuln { node_number, event_number: w }
            | Self::Ason { node_number, device_number: w }
            | Self::Asof { node_number, device_number: w }
            | Self::Asrq { node_number, device_number: w }
            | Self::Arson { node_number, device_number: w }
            | Self::Arsof { node_number, device_number: w } => {
                out.extend(node_number.to_be_bytes());
                out.extend(w.to_be_bytes());
            }

            Self::Nvset { node_number, nv_index: a, nv_value: b }
            | Self::Nvans { node_number, nv_index: a, nv_value: b }
            | Self::Paran { node_number, param_index: a, param_value: b }
            | Self::Reval { node_number, event_index: a, ev_index: b } => {
                out.extend(node_number.to_be_bytes());
                out.extend([*a, *b]);
            }

            Self::Reqev {
                node_number,
                event_number,
                ev_index,
            } => {
                out.extend(node_number.to_be_bytes());
                out.extend(event_number.to_be_bytes());
                out.push(*ev_index);
            }
            Self::Neval {
                node_number,
                event_index,
                ev_index,
                ev_value,
            } => {
                out.extend(node_number.to_be_bytes());
                out.extend([*event_index, *ev_index, *ev_value]);
            }
            Self::Pnn {
                node_number,
                manufacturer_id,
                module_id,
                flags,
            } => {
                out.extend(node_number.to_be_bytes());
                out.extend([*manufacturer_id, *module_id, *flags]);
            }

            Self::Evlrn {
                node_number,
                event_number,
                ev_index,
                ev_value,
            }
            | Self::Evans {
                node_number,
                event_number,
                ev_index,
                ev_value,
            } => {
                out.extend(node_number.to_be_bytes());
                out.extend(event_number.to_be_bytes());
                out.extend([*ev_index, *ev_value]);
            }

            Self::Name { name } => out.extend_from_slice(name),
            Self::Params { params } => out.extend_from_slice(params),
            Self::Enrsp {
                node_number,
                event,
                event_index,
            } => {
                out.extend(node_number.to_be_bytes());
                out.extend(event.to_bytes());
                out.push(*event_index);
            }

            Self::Unknown { data, .. } => out.extend_from_slice(data),
        }
        out
    }

    /// Build a NAME message, truncating or space-padding to seven characters
    pub fn name_response(name: &str) -> Self {
        let mut padded = [b' '; 7];
        for (slot, byte) in padded.iter_mut().zip(name.bytes()) {
            *slot = byte;
        }
        Self::Name { name: padded }
    }
}

impl fmt::Display for CbusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown { opcode, data } => {
                write!(f, "opcode 0x{:02X} [{}]", opcode, hex::encode_upper(data))
            }
            Self::Kloc { session } | Self::Qloc { session } | Self::Dkeep { session } => {
                write!(f, "{} session={}", self.name(), session)
            }
            Self::Name { name } => write!(f, "NAME {:?}", String::from_utf8_lossy(name)),
            Self::Params { params } => write!(f, "PARAMS {:02X?}", params),
            Self::Enrsp {
                node_number,
                event,
                event_index,
            } => write!(
                f,
                "ENRSP node={} event={} index={}",
                node_number, event, event_index
            ),
            other => {
                write!(f, "{}", other.name())?;
                if let Some(nn) = other.node_number() {
                    write!(f, " node={}", nn)?;
                }
                let data = other.data();
                if data.len() > 2 {
                    write!(f, " [{}]", hex::encode_upper(&data[2..]))?;
                }
                Ok(())
            }
        }
    }
}
