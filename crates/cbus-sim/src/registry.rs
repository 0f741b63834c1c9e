//! Registry of simulated modules, keyed by node number

use cbus_protocol::NodeNumber;

use crate::error::SimError;
use crate::module::Module;

/// The set of modules on the simulated bus
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: Vec<Module>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module
    ///
    /// Node numbers must be unique, except that any number of modules may
    /// sit in setup mode at node 0.
    pub fn register(&mut self, module: Module) -> Result<(), SimError> {
        let nn = module.node_number();
        if nn != 0 && self.find(nn).is_some() {
            return Err(SimError::DuplicateNodeNumber(nn));
        }
        tracing::debug!(
            "Registered {} at node {}",
            module.module_type().name,
            nn
        );
        self.modules.push(module);
        Ok(())
    }

    pub fn find(&self, node_number: NodeNumber) -> Option<&Module> {
        self.modules.iter().find(|m| m.node_number() == node_number)
    }

    pub fn find_mut(&mut self, node_number: NodeNumber) -> Option<&mut Module> {
        self.modules
            .iter_mut()
            .find(|m| m.node_number() == node_number)
    }

    /// All modules in registration order
    pub fn all(&self) -> &[Module] {
        &self.modules
    }

    pub fn all_mut(&mut self) -> impl Iterator<Item = &mut Module> {
        self.modules.iter_mut()
    }

    /// Modules currently awaiting a node number
    pub fn in_setup(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter().filter(|m| m.is_in_setup())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
