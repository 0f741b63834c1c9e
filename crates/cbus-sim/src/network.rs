//! Bus-wide state: the module registry plus learn mode

use cbus_protocol::NodeNumber;

use crate::module::Module;
use crate::registry::ModuleRegistry;

/// Shared state of the simulated network
///
/// At most one node is in learn mode at a time; NNLRN for another node
/// replaces it.
#[derive(Debug, Clone, Default)]
pub struct NetworkState {
    registry: ModuleRegistry,
    learning_node: Option<NodeNumber>,
}

impl NetworkState {
    pub fn new(registry: ModuleRegistry) -> Self {
        Self {
            registry,
            learning_node: None,
        }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.registry
    }

    /// Node currently in learn mode
    pub fn learning_node(&self) -> Option<NodeNumber> {
        self.learning_node
    }

    pub fn is_learning(&self, node_number: NodeNumber) -> bool {
        self.learning_node == Some(node_number)
    }

    /// Put `node_number` into learn mode, returning the node it displaced
    pub fn enter_learn(&mut self, node_number: NodeNumber) -> Option<NodeNumber> {
        self.learning_node
            .replace(node_number)
            .filter(|&previous| previous != node_number)
    }

    /// Leave learn mode if `node_number` is the learning node
    pub fn exit_learn(&mut self, node_number: NodeNumber) -> bool {
        if self.is_learning(node_number) {
            self.learning_node = None;
            true
        } else {
            false
        }
    }

    /// The module in learn mode, if it is registered
    pub fn learning_module_mut(&mut self) -> Option<&mut Module> {
        let nn = self.learning_node?;
        self.registry.find_mut(nn)
    }
}
