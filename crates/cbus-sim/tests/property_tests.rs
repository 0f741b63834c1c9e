//! Property tests for the simulated modules

use cbus_protocol::{CbusMessage, EventName, NodeNumber};
use cbus_sim::{Dispatcher, Module, ModuleRegistry, ModuleTypeDatabase, NetworkState};
use proptest::prelude::*;

// ============================================================================
// Helpers
// ============================================================================

mod helpers {
    use super::*;

    pub const TYPES: &[&str] = &["CANACC5", "CANACC8", "CANSERVO8C", "CANMIO", "CANPAN", "CANCDU"];

    pub fn dispatcher(types: &[(&str, NodeNumber)]) -> Dispatcher {
        let mut registry = ModuleRegistry::new();
        for (name, nn) in types {
            let module_type = ModuleTypeDatabase::by_name(name).unwrap();
            registry.register(Module::new(module_type, *nn)).unwrap();
        }
        Dispatcher::new(NetworkState::new(registry))
    }

    pub fn total_events(d: &Dispatcher) -> usize {
        d.state().registry().all().iter().map(|m| m.event_count()).sum()
    }
}

// ============================================================================
// Property Tests
// ============================================================================

fn module_type_name() -> impl Strategy<Value = &'static str> {
    prop::sample::select(helpers::TYPES)
}

proptest! {
    #[test]
    fn nv_set_then_read(type_name in module_type_name(), index in 1u8..=255, value: u8) {
        let mut d = helpers::dispatcher(&[(type_name, 300)]);
        let count = d.state().registry().find(300).unwrap().node_variable_count();

        let set = d.handle_message(CbusMessage::Nvset { node_number: 300, nv_index: index, nv_value: value });
        let read = d.handle_message(CbusMessage::Nvrd { node_number: 300, nv_index: index });

        if index <= count {
            prop_assert_eq!(set, vec![CbusMessage::Wrack { node_number: 300 }]);
            prop_assert_eq!(read, vec![CbusMessage::Nvans { node_number: 300, nv_index: index, nv_value: value }]);
        } else {
            let err = CbusMessage::Cmderr { node_number: 300, error: 10 };
            prop_assert_eq!(set, vec![err.clone()]);
            prop_assert_eq!(read, vec![err]);
        }
    }

    #[test]
    fn rejected_nvset_leaves_state_unchanged(index in 9u8..=255, value: u8) {
        let mut d = helpers::dispatcher(&[("CANACC5", 300)]);
        let before = d.state().registry().find(300).unwrap().node_variables().to_vec();
        d.handle_message(CbusMessage::Nvset { node_number: 300, nv_index: index, nv_value: value });
        prop_assert_eq!(d.state().registry().find(300).unwrap().node_variables(), &before[..]);
    }

    #[test]
    fn evlrn_outside_learn_mode_never_mutates(
        node_number: u16,
        event_number: u16,
        ev_index: u8,
        ev_value: u8,
    ) {
        let mut d = helpers::dispatcher(&[("CANACC5", 300), ("CANMIO", 301)]);
        let replies = d.handle_message(CbusMessage::Evlrn { node_number, event_number, ev_index, ev_value });
        prop_assert_eq!(replies, vec![CbusMessage::Cmderr { node_number: 0, error: 2 }]);
        prop_assert_eq!(helpers::total_events(&d), 0);
    }

    #[test]
    fn only_learning_node_is_taught(
        learner in prop::sample::select(vec![300u16, 301]),
        events in prop::collection::vec((1u16..=50, 1u16..=50), 1..20),
    ) {
        let mut d = helpers::dispatcher(&[("CANACC5", 300), ("CANMIO", 301)]);
        d.handle_message(CbusMessage::Nnlrn { node_number: learner });

        for (nn, en) in &events {
            let replies = d.handle_message(CbusMessage::Evlrn {
                node_number: *nn,
                event_number: *en,
                ev_index: 1,
                ev_value: 1,
            });
            prop_assert_eq!(replies, vec![CbusMessage::Wrack { node_number: learner }]);
        }

        let other = if learner == 300 { 301 } else { 300 };
        let registry = d.state().registry();
        prop_assert_eq!(registry.find(other).unwrap().event_count(), 0);

        let mut distinct: Vec<_> = events.iter().map(|(n, e)| EventName::new(*n, *e)).collect();
        distinct.sort();
        distinct.dedup();
        prop_assert_eq!(registry.find(learner).unwrap().event_count(), distinct.len());
    }

    #[test]
    fn fan_out_matches_only_stored_events(stored in 1u16..=20, probe in 1u16..=20) {
        let mut servo = Module::new(ModuleTypeDatabase::by_name("CANSERVO8C").unwrap(), 302);
        servo.add_event(EventName::new(1, stored)).unwrap();
        let mut registry = ModuleRegistry::new();
        registry.register(servo).unwrap();
        let mut d = Dispatcher::new(NetworkState::new(registry));

        let replies = d.handle_message(CbusMessage::Acon { node_number: 1, event_number: probe });
        if stored == probe {
            prop_assert_eq!(replies, vec![CbusMessage::Acon { node_number: 302, event_number: 1 }]);
        } else {
            prop_assert!(replies.is_empty());
        }
    }
}
