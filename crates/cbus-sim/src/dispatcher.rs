//! Frame dispatcher
//!
//! Applies one inbound frame at a time to the network state and returns the
//! frames the simulated modules send in reply.

use cbus_protocol::{
    BootResponse, CbusMessage, ControlCommand, EventName, Frame, NodeNumber,
};

use crate::error::ModuleError;
use crate::module_types::flags;
use crate::network::NetworkState;

/// EVNLF reply; the simulator always reports this much event space
pub const EVENT_SPACE_LEFT: u8 = 0;

/// CMDERR codes sent by the simulated modules
pub mod cmderr {
    /// Command needs learn mode
    pub const NOT_IN_LEARN_MODE: u8 = 2;
    /// Event table has no room
    pub const TOO_MANY_EVENTS: u8 = 4;
    /// Event variable index out of range
    pub const INVALID_EV_INDEX: u8 = 6;
    /// Event (or event index) not found
    pub const INVALID_EVENT: u8 = 7;
    /// Parameter index out of range
    pub const INVALID_PARAM_INDEX: u8 = 9;
    /// Node variable index out of range
    pub const INVALID_NV_INDEX: u8 = 10;
}

/// Accessory event kinds that fan out to consuming modules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessoryKind {
    /// ACON
    On,
    /// ACOF
    Off,
    /// ASON
    ShortOn,
    /// ASOF
    ShortOff,
}

impl AccessoryKind {
    /// The same kind of message, sent by `node_number` for `number`
    pub fn message(self, node_number: NodeNumber, number: u16) -> CbusMessage {
        match self {
            Self::On => CbusMessage::Acon { node_number, event_number: number },
            Self::Off => CbusMessage::Acof { node_number, event_number: number },
            Self::ShortOn => CbusMessage::Ason { node_number, device_number: number },
            Self::ShortOff => CbusMessage::Asof { node_number, device_number: number },
        }
    }
}

/// Routes decoded frames to the simulated modules
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    state: NetworkState,
}

impl Dispatcher {
    pub fn new(state: NetworkState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &NetworkState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut NetworkState {
        &mut self.state
    }

    /// Parse and handle one frame of GridConnect text
    ///
    /// Undecodable frames are logged and produce nothing.
    pub fn handle_text(&mut self, text: &str) -> Vec<Frame> {
        match Frame::parse(text) {
            Ok(frame) => self.handle_frame(frame),
            Err(e) => {
                tracing::warn!("Discarding malformed frame {:?}: {}", text, e);
                Vec::new()
            }
        }
    }

    /// Handle one decoded frame
    pub fn handle_frame(&mut self, frame: Frame) -> Vec<Frame> {
        match frame {
            Frame::Standard { message, .. } => self
                .handle_message(message)
                .into_iter()
                .map(Frame::standard)
                .collect(),
            Frame::Extended { identifier, data } => self.handle_control(identifier, &data),
        }
    }

    /// Put a module into setup mode; it announces itself with RQNN
    ///
    /// Returns `None` when no module has that node number.
    pub fn enter_setup(&mut self, node_number: NodeNumber) -> Option<Frame> {
        let module = self.state.registry_mut().find_mut(node_number)?;
        module.start_setup();
        tracing::info!("Node {} entered setup mode", node_number);
        Some(Frame::standard(CbusMessage::Rqnn { node_number }))
    }

    fn handle_control(&mut self, identifier: u32, data: &[u8]) -> Vec<Frame> {
        let Some(command) = ControlCommand::from_payload(data) else {
            tracing::warn!("Extended frame {:08X} has no control byte", identifier);
            return Vec::new();
        };
        tracing::debug!("Control {:?} on {:08X}", command, identifier);

        match command {
            ControlCommand::Nop | ControlCommand::ResetChecksum => Vec::new(),
            ControlCommand::Reset => {
                tracing::info!("Bootloader reset requested");
                Vec::new()
            }
            ControlCommand::CheckRun => vec![BootResponse::Ok.to_frame()],
            ControlCommand::BootTest => vec![BootResponse::BootConfirmed.to_frame()],
            ControlCommand::Unknown(code) => {
                tracing::warn!("Unknown control sub-command {}", code);
                Vec::new()
            }
        }
    }

    /// Handle one standard message, returning the replies
    pub fn handle_message(&mut self, message: CbusMessage) -> Vec<CbusMessage> {
        tracing::debug!("<- {}", message);

        match message {
            CbusMessage::Qnn => self.query_nodes(),

            CbusMessage::Rqnp => self
                .state
                .registry()
                .all()
                .iter()
                .map(|m| CbusMessage::Params {
                    params: m.parameter_block(),
                })
                .collect(),

            CbusMessage::Rqmn => self
                .state
                .registry()
                .in_setup()
                .map(|m| CbusMessage::name_response(m.module_type().short_name()))
                .collect(),

            CbusMessage::Snn { node_number } => {
                self.assign_node_number(node_number);
                vec![CbusMessage::Nnack { node_number }]
            }

            CbusMessage::Nnlrn { node_number } => {
                if let Some(previous) = self.state.enter_learn(node_number) {
                    tracing::info!("Node {} left learn mode", previous);
                }
                tracing::info!("Node {} in learn mode", node_number);
                Vec::new()
            }

            CbusMessage::Nnuln { node_number } => {
                if self.state.exit_learn(node_number) {
                    tracing::info!("Node {} out of learn mode", node_number);
                }
                Vec::new()
            }

            CbusMessage::Nnclr { node_number } => {
                let learning = self.state.is_learning(node_number);
                match self.state.registry_mut().find_mut(node_number) {
                    Some(module) if learning => {
                        module.clear_events();
                        vec![CbusMessage::Wrack { node_number }]
                    }
                    Some(_) => {
                        tracing::warn!("NNCLR for node {} outside learn mode", node_number);
                        Vec::new()
                    }
                    None => Vec::new(),
                }
            }

            CbusMessage::Nnevn { node_number } => self
                .state
                .registry()
                .find(node_number)
                .map(|_| CbusMessage::Evnlf {
                    node_number,
                    space: EVENT_SPACE_LEFT,
                })
                .into_iter()
                .collect(),

            CbusMessage::Nerd { node_number } => match self.state.registry().find(node_number) {
                Some(module) => module
                    .events()
                    .iter()
                    .enumerate()
                    .map(|(i, e)| CbusMessage::Enrsp {
                        node_number,
                        event: e.name(),
                        event_index: i as u8,
                    })
                    .collect(),
                None => Vec::new(),
            },

            CbusMessage::Rqevn { node_number } => self
                .state
                .registry()
                .find(node_number)
                .map(|m| CbusMessage::Numev {
                    node_number,
                    count: m.event_count() as u8,
                })
                .into_iter()
                .collect(),

            CbusMessage::Evuln {
                node_number,
                event_number,
            } => self.unlearn_event(EventName::new(node_number, event_number)),

            CbusMessage::Nvset {
                node_number,
                nv_index,
                nv_value,
            } => match self.state.registry_mut().find_mut(node_number) {
                Some(module) => match module.set_node_variable(nv_index, nv_value) {
                    Ok(()) => vec![CbusMessage::Wrack { node_number }],
                    Err(e) => {
                        tracing::debug!("NVSET node {}: {}", node_number, e);
                        vec![CbusMessage::Cmderr {
                            node_number,
                            error: cmderr::INVALID_NV_INDEX,
                        }]
                    }
                },
                None => Vec::new(),
            },

            CbusMessage::Nvrd {
                node_number,
                nv_index,
            } => match self.state.registry().find(node_number) {
                Some(module) => match module.node_variable(nv_index) {
                    Some(nv_value) => vec![CbusMessage::Nvans {
                        node_number,
                        nv_index,
                        nv_value,
                    }],
                    None => vec![CbusMessage::Cmderr {
                        node_number,
                        error: cmderr::INVALID_NV_INDEX,
                    }],
                },
                None => Vec::new(),
            },

            CbusMessage::Acon {
                node_number,
                event_number,
            } => self.fan_out(EventName::new(node_number, event_number), AccessoryKind::On),
            CbusMessage::Acof {
                node_number,
                event_number,
            } => self.fan_out(EventName::new(node_number, event_number), AccessoryKind::Off),
            CbusMessage::Ason {
                node_number,
                device_number,
            } => self.fan_out(
                EventName::new(node_number, device_number),
                AccessoryKind::ShortOn,
            ),
            CbusMessage::Asof {
                node_number,
                device_number,
            } => self.fan_out(
                EventName::new(node_number, device_number),
                AccessoryKind::ShortOff,
            ),

            CbusMessage::Reval {
                node_number,
                event_index,
                ev_index,
            } => self.read_event_variable(node_number, event_index, ev_index),

            CbusMessage::Reqev {
                node_number,
                event_number,
                ev_index,
            } => self.read_event_by_name(EventName::new(node_number, event_number), ev_index),

            CbusMessage::Evlrn {
                node_number,
                event_number,
                ev_index,
                ev_value,
            } => self.teach_event(EventName::new(node_number, event_number), ev_index, ev_value),

            CbusMessage::Rqnpn {
                node_number,
                param_index,
            } => match self.state.registry().find(node_number) {
                Some(module) => match module.parameter(param_index) {
                    Some(param_value) => vec![CbusMessage::Paran {
                        node_number,
                        param_index,
                        param_value,
                    }],
                    None => vec![CbusMessage::Cmderr {
                        node_number,
                        error: cmderr::INVALID_PARAM_INDEX,
                    }],
                },
                None => Vec::new(),
            },

            CbusMessage::Nenrd {
                node_number,
                event_index,
            } => match self.state.registry().find(node_number) {
                Some(module) => match module.event_at(event_index) {
                    Some(event) => vec![CbusMessage::Enrsp {
                        node_number,
                        event: event.name(),
                        event_index,
                    }],
                    None => vec![CbusMessage::Cmderr {
                        node_number,
                        error: cmderr::INVALID_EVENT,
                    }],
                },
                None => Vec::new(),
            },

            CbusMessage::Nnrst { node_number } => {
                if let Some(module) = self.state.registry_mut().find_mut(node_number) {
                    module.reset_node_variables();
                    tracing::info!("Node {} reset", node_number);
                }
                Vec::new()
            }

            CbusMessage::Unknown { opcode, .. } => {
                tracing::warn!("Unknown opcode {:02X}", opcode);
                Vec::new()
            }

            CbusMessage::Ack
            | CbusMessage::Nak
            | CbusMessage::Hlt
            | CbusMessage::Bon
            | CbusMessage::Tof
            | CbusMessage::Ton
            | CbusMessage::Estop
            | CbusMessage::Arst
            | CbusMessage::Rtof
            | CbusMessage::Rton
            | CbusMessage::Restp
            | CbusMessage::Rstat
            | CbusMessage::Kloc { .. }
            | CbusMessage::Qloc { .. }
            | CbusMessage::Dkeep { .. }
            | CbusMessage::Rqnn { .. }
            | CbusMessage::Nnrel { .. }
            | CbusMessage::Nnack { .. }
            | CbusMessage::Wrack { .. }
            | CbusMessage::Rqdat { .. }
            | CbusMessage::Bootm { .. }
            | CbusMessage::Nnrsm { .. }
            | CbusMessage::Cmderr { .. }
            | CbusMessage::Evnlf { .. }
            | CbusMessage::Numev { .. }
            | CbusMessage::Areq { .. }
            | CbusMessage::Aron { .. }
            | CbusMessage::Arof { .. }
            | CbusMessage::Nvans { .. }
            | CbusMessage::Asrq { .. }
            | CbusMessage::Arson { .. }
            | CbusMessage::Arsof { .. }
            | CbusMessage::Paran { .. }
            | CbusMessage::Neval { .. }
            | CbusMessage::Pnn { .. }
            | CbusMessage::Evans { .. }
            | CbusMessage::Name { .. }
            | CbusMessage::Params { .. }
            | CbusMessage::Enrsp { .. } => {
                tracing::debug!("{} not handled by simulated modules", message.name());
                Vec::new()
            }
        }
    }

    /// Give the first module in setup mode a new node number
    ///
    /// Node numbers stay unique: a number held by any other module is refused.
    fn assign_node_number(&mut self, node_number: NodeNumber) {
        let registry = self.state.registry_mut();
        let Some(index) = registry.all().iter().position(|m| m.is_in_setup()) else {
            tracing::debug!("SNN {} with no module in setup", node_number);
            return;
        };
        let taken = registry
            .all()
            .iter()
            .enumerate()
            .any(|(i, m)| i != index && m.node_number() == node_number);
        if taken {
            tracing::warn!("SNN {} refused: node number already in use", node_number);
            return;
        }
        if let Some(module) = registry.all_mut().nth(index) {
            if module.set_node_number(node_number) {
                tracing::info!(
                    "{} adopted node number {}",
                    module.module_type().name,
                    node_number
                );
            }
        }
    }

    fn query_nodes(&self) -> Vec<CbusMessage> {
        self.state
            .registry()
            .all()
            .iter()
            .map(|m| {
                let mut module_flags = m.flags();
                if self.state.is_learning(m.node_number()) {
                    module_flags |= flags::LEARN;
                }
                CbusMessage::Pnn {
                    node_number: m.node_number(),
                    manufacturer_id: m.manufacturer_id(),
                    module_id: m.module_id(),
                    flags: module_flags,
                }
            })
            .collect()
    }

    /// Every module storing `event` echoes it if its feedback policy allows
    fn fan_out(&self, event: EventName, kind: AccessoryKind) -> Vec<CbusMessage> {
        let mut replies = Vec::new();
        for module in self.state.registry().all() {
            let Some(index) = module.event_index(event) else {
                continue;
            };
            if module.should_feedback(index) {
                replies.push(kind.message(module.node_number(), index as u16 + 1));
            }
        }
        if !replies.is_empty() {
            tracing::debug!("Event {} produced {} feedback message(s)", event, replies.len());
        }
        replies
    }

    fn unlearn_event(&mut self, event: EventName) -> Vec<CbusMessage> {
        let Some(learning) = self.state.learning_node() else {
            tracing::warn!("EVULN {} while no node is in learn mode", event);
            return Vec::new();
        };
        let Some(module) = self.state.learning_module_mut() else {
            tracing::warn!("EVULN {}: learning node {} not present", event, learning);
            return Vec::new();
        };
        if !module.delete_event(event) {
            tracing::debug!("EVULN {}: not stored on node {}", event, learning);
        }
        vec![CbusMessage::Wrack {
            node_number: learning,
        }]
    }

    fn read_event_variable(
        &self,
        node_number: NodeNumber,
        event_index: u8,
        ev_index: u8,
    ) -> Vec<CbusMessage> {
        let Some(module) = self.state.registry().find(node_number) else {
            return Vec::new();
        };
        let Some(event) = module.event_at(event_index) else {
            tracing::warn!("REVAL node {}: no event at index {}", node_number, event_index);
            return Vec::new();
        };
        match event.variable(ev_index) {
            Some(ev_value) => vec![CbusMessage::Neval {
                node_number,
                event_index,
                ev_index,
                ev_value,
            }],
            None => vec![CbusMessage::Cmderr {
                node_number,
                error: cmderr::INVALID_EV_INDEX,
            }],
        }
    }

    fn read_event_by_name(&mut self, event: EventName, ev_index: u8) -> Vec<CbusMessage> {
        let Some(module) = self.state.learning_module_mut() else {
            tracing::warn!("REQEV {} while no module is in learn mode", event);
            return Vec::new();
        };
        let learning = module.node_number();
        let stored = match module.find_or_create_event(event) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::debug!("REQEV {} on node {}: {}", event, learning, e);
                return vec![CbusMessage::Cmderr {
                    node_number: learning,
                    error: cmderr::INVALID_EVENT,
                }];
            }
        };
        match stored.variable(ev_index) {
            Some(ev_value) => vec![CbusMessage::Evans {
                node_number: event.node_number(),
                event_number: event.event_number(),
                ev_index,
                ev_value,
            }],
            None => vec![CbusMessage::Cmderr {
                node_number: learning,
                error: cmderr::INVALID_EV_INDEX,
            }],
        }
    }

    fn teach_event(&mut self, event: EventName, ev_index: u8, ev_value: u8) -> Vec<CbusMessage> {
        let Some(module) = self.state.learning_module_mut() else {
            tracing::warn!("EVLRN {} while no module is in learn mode", event);
            return vec![CbusMessage::Cmderr {
                node_number: 0,
                error: cmderr::NOT_IN_LEARN_MODE,
            }];
        };
        let learning = module.node_number();

        // Reject a bad variable index before the event is auto-created
        if ev_index > module.event_variable_count() {
            return vec![CbusMessage::Cmderr {
                node_number: learning,
                error: cmderr::INVALID_EV_INDEX,
            }];
        }

        let result = module
            .find_or_create_event(event)
            .and_then(|stored| stored.set_variable(ev_index, ev_value));
        match result {
            Ok(()) => {
                tracing::debug!(
                    "Node {} learned {} EV{} = {}",
                    learning,
                    event,
                    ev_index,
                    ev_value
                );
                vec![CbusMessage::Wrack {
                    node_number: learning,
                }]
            }
            Err(e) => {
                tracing::debug!("EVLRN {} on node {}: {}", event, learning, e);
                let error = match e {
                    ModuleError::EventTableFull { .. } => cmderr::TOO_MANY_EVENTS,
                    ModuleError::IndexOutOfRange { .. } | ModuleError::DuplicateEvent(_) => {
                        cmderr::INVALID_EV_INDEX
                    }
                };
                vec![CbusMessage::Cmderr {
                    node_number: learning,
                    error,
                }]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;
    use crate::module_types::ModuleTypeDatabase;
    use crate::registry::ModuleRegistry;
    use cbus_protocol::EncodeFrame;

    fn module(name: &str, nn: NodeNumber) -> Module {
        Module::new(ModuleTypeDatabase::by_name(name).unwrap(), nn)
    }

    fn dispatcher(modules: Vec<Module>) -> Dispatcher {
        let mut registry = ModuleRegistry::new();
        for m in modules {
            registry.register(m).unwrap();
        }
        Dispatcher::new(NetworkState::new(registry))
    }

    fn handle(d: &mut Dispatcher, text: &str) -> Vec<String> {
        d.handle_text(text).iter().map(|f| f.encode()).collect()
    }

    fn learn(d: &mut Dispatcher, nn: NodeNumber) {
        assert!(d.handle_message(CbusMessage::Nnlrn { node_number: nn }).is_empty());
    }

    #[test]
    fn test_qnn_one_pnn_per_module() {
        let mut d = dispatcher(vec![module("CANACC5", 300), module("CANMIO", 301)]);
        let replies = d.handle_message(CbusMessage::Qnn);
        assert_eq!(replies.len(), 2);
        assert_eq!(
            replies[0],
            CbusMessage::Pnn {
                node_number: 300,
                manufacturer_id: 165,
                module_id: 2,
                flags: flags::CONSUMER | flags::BOOTLOADING | flags::FLIM,
            }
        );
        assert!(matches!(
            replies[1],
            CbusMessage::Pnn { node_number: 301, module_id: 32, .. }
        ));
    }

    #[test]
    fn test_qnn_reports_learn_flag() {
        let mut d = dispatcher(vec![module("CANACC5", 300)]);
        learn(&mut d, 300);
        match d.handle_message(CbusMessage::Qnn).as_slice() {
            [CbusMessage::Pnn { flags: f, .. }] => assert_ne!(f & flags::LEARN, 0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rqnp_params_block() {
        let mut d = dispatcher(vec![module("CANACC8", 300)]);
        assert_eq!(
            d.handle_message(CbusMessage::Rqnp),
            vec![CbusMessage::Params {
                params: [165, b'v', 3, 128, 2, 8, 2],
            }]
        );
    }

    #[test]
    fn test_setup_rqmn_and_snn() {
        let mut d = dispatcher(vec![module("CANACC5", 300), module("CANPAN", 301)]);
        assert!(d.handle_message(CbusMessage::Rqmn).is_empty());

        let rqnn = d.enter_setup(301).unwrap();
        assert_eq!(rqnn.encode(), ":SB780N50012D;");
        assert!(d.enter_setup(999).is_none());

        assert_eq!(
            d.handle_message(CbusMessage::Rqmn),
            vec![CbusMessage::name_response("PAN")]
        );

        assert_eq!(
            d.handle_message(CbusMessage::Snn { node_number: 400 }),
            vec![CbusMessage::Nnack { node_number: 400 }]
        );
        let registry = d.state().registry();
        assert!(registry.find(301).is_none());
        assert!(!registry.find(400).unwrap().is_in_setup());
        assert_eq!(registry.find(300).unwrap().module_type().name, "CANACC5");
    }

    #[test]
    fn test_snn_refuses_number_held_by_another_module() {
        let mut d = dispatcher(vec![module("CANACC5", 300), module("CANPAN", 304)]);
        d.enter_setup(304).unwrap();

        assert_eq!(
            d.handle_message(CbusMessage::Snn { node_number: 300 }),
            vec![CbusMessage::Nnack { node_number: 300 }]
        );
        let registry = d.state().registry();
        assert_eq!(
            registry.all().iter().filter(|m| m.node_number() == 300).count(),
            1
        );
        assert_eq!(registry.find(300).unwrap().module_type().name, "CANACC5");
        let pan = registry.find(304).unwrap();
        assert_eq!(pan.module_type().name, "CANPAN");
        assert!(pan.is_in_setup());

        // The PAN is still reachable and can take a free number
        d.handle_message(CbusMessage::Snn { node_number: 305 });
        let registry = d.state().registry();
        assert_eq!(registry.find(305).unwrap().module_type().name, "CANPAN");
        assert!(registry.find(304).is_none());
    }

    #[test]
    fn test_snn_renumbers_only_first_setup_module() {
        let mut d = dispatcher(vec![module("CANACC5", 300), module("CANACC8", 301)]);
        d.enter_setup(300).unwrap();
        d.enter_setup(301).unwrap();

        d.handle_message(CbusMessage::Snn { node_number: 500 });
        let registry = d.state().registry();
        assert_eq!(
            registry.all().iter().filter(|m| m.node_number() == 500).count(),
            1
        );
        assert_eq!(registry.find(500).unwrap().module_type().name, "CANACC5");
        assert!(registry.find(301).unwrap().is_in_setup());

        d.handle_message(CbusMessage::Snn { node_number: 501 });
        let registry = d.state().registry();
        assert_eq!(registry.find(501).unwrap().module_type().name, "CANACC8");
        assert_eq!(registry.in_setup().count(), 0);
    }

    #[test]
    fn test_snn_acknowledged_without_setup_module() {
        let mut d = dispatcher(vec![module("CANACC5", 300)]);
        assert_eq!(
            handle(&mut d, ":SB780N420001;"),
            vec![":SB780N520001;".to_string()]
        );
        assert!(d.state().registry().find(1).is_none());
    }

    #[test]
    fn test_nvset_nvrd() {
        let mut d = dispatcher(vec![module("CANACC5", 300)]);
        assert_eq!(
            d.handle_message(CbusMessage::Nvset { node_number: 300, nv_index: 3, nv_value: 0x42 }),
            vec![CbusMessage::Wrack { node_number: 300 }]
        );
        assert_eq!(
            d.handle_message(CbusMessage::Nvrd { node_number: 300, nv_index: 3 }),
            vec![CbusMessage::Nvans { node_number: 300, nv_index: 3, nv_value: 0x42 }]
        );
        assert_eq!(
            d.handle_message(CbusMessage::Nvset { node_number: 300, nv_index: 9, nv_value: 1 }),
            vec![CbusMessage::Cmderr { node_number: 300, error: 10 }]
        );
        assert_eq!(
            d.handle_message(CbusMessage::Nvrd { node_number: 300, nv_index: 9 }),
            vec![CbusMessage::Cmderr { node_number: 300, error: 10 }]
        );
        // Unknown node: silence
        assert!(d
            .handle_message(CbusMessage::Nvrd { node_number: 301, nv_index: 1 })
            .is_empty());
    }

    #[test]
    fn test_nnrst_restores_node_variables() {
        let mut d = dispatcher(vec![module("CANACC5", 300)]);
        d.handle_message(CbusMessage::Nvset { node_number: 300, nv_index: 1, nv_value: 9 });
        assert!(d.handle_message(CbusMessage::Nnrst { node_number: 300 }).is_empty());
        assert_eq!(
            d.handle_message(CbusMessage::Nvrd { node_number: 300, nv_index: 1 }),
            vec![CbusMessage::Nvans { node_number: 300, nv_index: 1, nv_value: 0 }]
        );
    }

    #[test]
    fn test_evlrn_without_learn_mode() {
        let mut d = dispatcher(vec![module("CANACC5", 300)]);
        assert_eq!(
            handle(&mut d, ":SB780ND2012D00010102;"),
            vec![":SB780N6F000002;".to_string()]
        );
        assert_eq!(d.state().registry().find(300).unwrap().event_count(), 0);
    }

    #[test]
    fn test_learn_read_and_unlearn() {
        let mut d = dispatcher(vec![module("CANACC5", 300)]);
        learn(&mut d, 300);

        assert_eq!(
            d.handle_message(CbusMessage::Evlrn {
                node_number: 301,
                event_number: 1,
                ev_index: 1,
                ev_value: 0x80,
            }),
            vec![CbusMessage::Wrack { node_number: 300 }]
        );
        assert_eq!(
            d.handle_message(CbusMessage::Reqev { node_number: 301, event_number: 1, ev_index: 1 }),
            vec![CbusMessage::Evans {
                node_number: 301,
                event_number: 1,
                ev_index: 1,
                ev_value: 0x80,
            }]
        );
        assert_eq!(
            d.handle_message(CbusMessage::Reqev { node_number: 301, event_number: 1, ev_index: 3 }),
            vec![CbusMessage::Cmderr { node_number: 300, error: 6 }]
        );
        assert_eq!(
            d.handle_message(CbusMessage::Rqevn { node_number: 300 }),
            vec![CbusMessage::Numev { node_number: 300, count: 1 }]
        );
        assert_eq!(
            d.handle_message(CbusMessage::Nerd { node_number: 300 }),
            vec![CbusMessage::Enrsp {
                node_number: 300,
                event: EventName::new(301, 1),
                event_index: 0,
            }]
        );

        assert_eq!(
            d.handle_message(CbusMessage::Evuln { node_number: 301, event_number: 1 }),
            vec![CbusMessage::Wrack { node_number: 300 }]
        );
        assert_eq!(d.state().registry().find(300).unwrap().event_count(), 0);

        learn(&mut d, 0);
        d.handle_message(CbusMessage::Nnuln { node_number: 0 });
        assert_eq!(d.state().learning_node(), None);
    }

    #[test]
    fn test_evlrn_bad_ev_index_creates_nothing() {
        let mut d = dispatcher(vec![module("CANACC5", 300)]);
        learn(&mut d, 300);
        assert_eq!(
            d.handle_message(CbusMessage::Evlrn {
                node_number: 301,
                event_number: 1,
                ev_index: 3,
                ev_value: 1,
            }),
            vec![CbusMessage::Cmderr { node_number: 300, error: 6 }]
        );
        assert_eq!(d.state().registry().find(300).unwrap().event_count(), 0);
    }

    #[test]
    fn test_evlrn_full_table() {
        let mut acc4 = module("CANACC4", 300);
        for n in 0..32 {
            acc4.add_event(EventName::new(1, n)).unwrap();
        }
        let mut d = dispatcher(vec![acc4]);
        learn(&mut d, 300);
        assert_eq!(
            d.handle_message(CbusMessage::Evlrn {
                node_number: 2,
                event_number: 1,
                ev_index: 1,
                ev_value: 1,
            }),
            vec![CbusMessage::Cmderr { node_number: 300, error: 4 }]
        );
        assert_eq!(
            d.handle_message(CbusMessage::Reqev { node_number: 2, event_number: 1, ev_index: 1 }),
            vec![CbusMessage::Cmderr { node_number: 300, error: 7 }]
        );
    }

    #[test]
    fn test_learn_mode_violations_are_silent() {
        let mut d = dispatcher(vec![module("CANACC5", 300)]);
        assert!(d
            .handle_message(CbusMessage::Evuln { node_number: 301, event_number: 1 })
            .is_empty());
        assert!(d
            .handle_message(CbusMessage::Reqev { node_number: 301, event_number: 1, ev_index: 1 })
            .is_empty());
        assert!(d.handle_message(CbusMessage::Nnclr { node_number: 300 }).is_empty());
    }

    #[test]
    fn test_nnclr_in_learn_mode() {
        let mut acc5 = module("CANACC5", 300);
        acc5.add_event(EventName::new(1, 1)).unwrap();
        let mut d = dispatcher(vec![acc5]);
        learn(&mut d, 300);
        assert_eq!(
            d.handle_message(CbusMessage::Nnclr { node_number: 300 }),
            vec![CbusMessage::Wrack { node_number: 300 }]
        );
        assert_eq!(d.state().registry().find(300).unwrap().event_count(), 0);
    }

    #[test]
    fn test_reval() {
        let mut acc5 = module("CANACC5", 300);
        acc5.add_event(EventName::new(1, 1))
            .unwrap()
            .set_variable(2, 5)
            .unwrap();
        let mut d = dispatcher(vec![acc5]);
        assert_eq!(
            d.handle_message(CbusMessage::Reval { node_number: 300, event_index: 0, ev_index: 2 }),
            vec![CbusMessage::Neval { node_number: 300, event_index: 0, ev_index: 2, ev_value: 5 }]
        );
        assert_eq!(
            d.handle_message(CbusMessage::Reval { node_number: 300, event_index: 0, ev_index: 3 }),
            vec![CbusMessage::Cmderr { node_number: 300, error: 6 }]
        );
        assert!(d
            .handle_message(CbusMessage::Reval { node_number: 300, event_index: 1, ev_index: 0 })
            .is_empty());
    }

    #[test]
    fn test_rqnpn_and_nenrd_bounds() {
        let mut acc5 = module("CANACC5", 300);
        acc5.add_event(EventName::new(1, 7)).unwrap();
        let mut d = dispatcher(vec![acc5]);
        assert_eq!(
            d.handle_message(CbusMessage::Rqnpn { node_number: 300, param_index: 1 }),
            vec![CbusMessage::Paran { node_number: 300, param_index: 1, param_value: 165 }]
        );
        assert_eq!(
            d.handle_message(CbusMessage::Rqnpn { node_number: 300, param_index: 21 }),
            vec![CbusMessage::Cmderr { node_number: 300, error: 9 }]
        );
        assert_eq!(
            d.handle_message(CbusMessage::Nenrd { node_number: 300, event_index: 0 }),
            vec![CbusMessage::Enrsp {
                node_number: 300,
                event: EventName::new(1, 7),
                event_index: 0,
            }]
        );
        assert_eq!(
            d.handle_message(CbusMessage::Nenrd { node_number: 300, event_index: 1 }),
            vec![CbusMessage::Cmderr { node_number: 300, error: 7 }]
        );
    }

    #[test]
    fn test_nnevn_constant_space() {
        let mut d = dispatcher(vec![module("CANACC5", 300)]);
        assert_eq!(
            d.handle_message(CbusMessage::Nnevn { node_number: 300 }),
            vec![CbusMessage::Evnlf { node_number: 300, space: EVENT_SPACE_LEFT }]
        );
    }

    #[test]
    fn test_fan_out_respects_feedback_policy() {
        let event = EventName::new(1, 1);
        let mut servo = module("CANSERVO8C", 302);
        servo.add_event(EventName::new(1, 9)).unwrap();
        servo.add_event(event).unwrap();
        let mut acc5 = module("CANACC5", 300);
        acc5.add_event(event).unwrap();
        let mut d = dispatcher(vec![acc5, servo]);

        assert_eq!(
            handle(&mut d, ":SB780N9000010001;"),
            vec![":SB780N90012E0002;".to_string()]
        );
        assert_eq!(
            d.handle_message(CbusMessage::Acof { node_number: 1, event_number: 1 }),
            vec![CbusMessage::Acof { node_number: 302, event_number: 2 }]
        );
        assert!(d
            .handle_message(CbusMessage::Acon { node_number: 1, event_number: 2 })
            .is_empty());
    }

    #[test]
    fn test_short_event_fan_out() {
        let mut mio = module("CANMIO", 303);
        mio.add_event(EventName::device(100)).unwrap();
        let mut d = dispatcher(vec![mio]);
        assert_eq!(
            d.handle_message(CbusMessage::Ason { node_number: 0, device_number: 100 }),
            vec![CbusMessage::Ason { node_number: 303, device_number: 1 }]
        );
        assert_eq!(
            d.handle_message(CbusMessage::Asof { node_number: 0, device_number: 100 }),
            vec![CbusMessage::Asof { node_number: 303, device_number: 1 }]
        );
    }

    #[test]
    fn test_first_events_policy() {
        let mut pan = module("CANPAN", 304);
        for n in 1..=33 {
            pan.add_event(EventName::new(5, n)).unwrap();
        }
        let mut d = dispatcher(vec![pan]);
        assert_eq!(
            d.handle_message(CbusMessage::Acon { node_number: 5, event_number: 32 }),
            vec![CbusMessage::Acon { node_number: 304, event_number: 32 }]
        );
        assert!(d
            .handle_message(CbusMessage::Acon { node_number: 5, event_number: 33 })
            .is_empty());
    }

    #[test]
    fn test_control_frames() {
        let mut d = Dispatcher::default();
        assert_eq!(handle(&mut d, ":X00080004N03;"), vec![":X10000004N01;".to_string()]);
        assert_eq!(handle(&mut d, ":X00080004N04;"), vec![":X10000004N02;".to_string()]);
        assert!(handle(&mut d, ":X00080004N00;").is_empty());
        assert!(handle(&mut d, ":X00080004N01;").is_empty());
        assert!(handle(&mut d, ":X00080004N02;").is_empty());
        assert!(handle(&mut d, ":X00080004N7F;").is_empty());
        assert!(handle(&mut d, ":X00080004N;").is_empty());
    }

    #[test]
    fn test_unknown_and_malformed_are_silent() {
        let mut d = dispatcher(vec![module("CANACC5", 300)]);
        assert!(handle(&mut d, ":SB780NFF;").is_empty());
        assert!(handle(&mut d, ":SB780NZZ;").is_empty());
        assert!(handle(&mut d, "garbage").is_empty());
        assert!(handle(&mut d, ":SB780N96;").is_empty());
        // Known but unhandled
        assert!(handle(&mut d, ":SA780N2101;").is_empty());
    }
}
