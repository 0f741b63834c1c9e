//! Simulated CBUS module
//!
//! A module owns its parameter table, node variables and stored (taught)
//! events. Reads return `None` when an index is out of range; writes return
//! a [`ModuleError`] so the caller can pick the matching CMDERR code.

use cbus_protocol::{EventName, NodeNumber};

use crate::error::ModuleError;
use crate::module_types::{flags, ModuleType};

/// CAN id given to modules that do not specify one
pub const DEFAULT_CAN_ID: u8 = 1;

fn default_node_variables(module_type: &ModuleType) -> Vec<u8> {
    let mut nvs = vec![0; module_type.node_variables as usize + 1];
    nvs[0] = module_type.node_variables;
    nvs
}

/// A taught event and its variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    name: EventName,
    variables: Vec<u8>,
}

impl StoredEvent {
    fn new(name: EventName, variable_count: u8) -> Self {
        Self {
            name,
            variables: vec![0; variable_count as usize + 1],
        }
    }

    /// The event's name
    pub fn name(&self) -> EventName {
        self.name
    }

    /// All event variables, index 0 included
    pub fn variables(&self) -> &[u8] {
        &self.variables
    }

    /// Read one event variable
    pub fn variable(&self, index: u8) -> Option<u8> {
        self.variables.get(index as usize).copied()
    }

    /// Write one event variable
    pub fn set_variable(&mut self, index: u8, value: u8) -> Result<(), ModuleError> {
        let len = self.variables.len();
        let slot = self
            .variables
            .get_mut(index as usize)
            .ok_or(ModuleError::IndexOutOfRange {
                table: "event variable",
                index: index as usize,
                len,
            })?;
        *slot = value;
        Ok(())
    }
}

/// A simulated module on the bus
#[derive(Debug, Clone)]
pub struct Module {
    module_type: &'static ModuleType,
    node_number: NodeNumber,
    can_id: u8,
    parameters: Vec<u8>,
    node_variables: Vec<u8>,
    events: Vec<StoredEvent>,
    setup_mode: bool,
}

impl Module {
    /// Create a module of `module_type` with node number `node_number`
    pub fn new(module_type: &'static ModuleType, node_number: NodeNumber) -> Self {
        Self {
            module_type,
            node_number,
            can_id: DEFAULT_CAN_ID,
            parameters: module_type.parameters(),
            node_variables: default_node_variables(module_type),
            events: Vec::new(),
            setup_mode: false,
        }
    }

    /// Builder-style CAN id override
    pub fn with_can_id(mut self, can_id: u8) -> Self {
        self.can_id = can_id;
        self
    }

    pub fn module_type(&self) -> &'static ModuleType {
        self.module_type
    }

    pub fn node_number(&self) -> NodeNumber {
        self.node_number
    }

    /// Adopt a new node number (SNN)
    ///
    /// Only takes effect in setup mode, which it then ends. Returns whether
    /// the number was adopted.
    pub fn set_node_number(&mut self, node_number: NodeNumber) -> bool {
        if !self.setup_mode {
            return false;
        }
        self.node_number = node_number;
        self.setup_mode = false;
        true
    }

    /// CAN id; cosmetic, frames from the simulator all use one id
    pub fn can_id(&self) -> u8 {
        self.can_id
    }

    pub fn set_can_id(&mut self, can_id: u8) {
        self.can_id = can_id;
    }

    pub fn manufacturer_id(&self) -> u8 {
        self.parameters[1]
    }

    pub fn module_id(&self) -> u8 {
        self.parameters[3]
    }

    /// Maximum number of stored events
    pub fn event_capacity(&self) -> usize {
        self.parameters[4] as usize
    }

    /// Variables per stored event, excluding index 0
    pub fn event_variable_count(&self) -> u8 {
        self.parameters[5]
    }

    /// Node variables, excluding index 0
    pub fn node_variable_count(&self) -> u8 {
        self.parameters[6]
    }

    /// Module flags as reported by PNN; FLiM is cleared while in setup
    pub fn flags(&self) -> u8 {
        if self.setup_mode {
            self.parameters[8] & !flags::FLIM
        } else {
            self.parameters[8]
        }
    }

    /// Read one parameter; index 0 is the parameter count
    pub fn parameter(&self, index: u8) -> Option<u8> {
        self.parameters.get(index as usize).copied()
    }

    /// Parameters 1 to 7, as carried by PARAMS
    pub fn parameter_block(&self) -> [u8; 7] {
        let mut block = [0u8; 7];
        block.copy_from_slice(&self.parameters[1..8]);
        block
    }

    /// All node variables; index 0 holds the count
    pub fn node_variables(&self) -> &[u8] {
        &self.node_variables
    }

    pub fn node_variable(&self, index: u8) -> Option<u8> {
        self.node_variables.get(index as usize).copied()
    }

    /// Write node variable `index`; index 0 (the count) is read-only
    pub fn set_node_variable(&mut self, index: u8, value: u8) -> Result<(), ModuleError> {
        let len = self.node_variables.len();
        let slot = match index {
            0 => None,
            i => self.node_variables.get_mut(i as usize),
        }
        .ok_or(ModuleError::IndexOutOfRange {
            table: "node variable",
            index: index as usize,
            len,
        })?;
        *slot = value;
        Ok(())
    }

    /// Restore node variables to their power-on values (NNRST)
    pub fn reset_node_variables(&mut self) {
        self.node_variables = default_node_variables(self.module_type);
    }

    pub fn events(&self) -> &[StoredEvent] {
        &self.events
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Stored event by table position
    pub fn event_at(&self, index: u8) -> Option<&StoredEvent> {
        self.events.get(index as usize)
    }

    pub fn find_event(&self, name: EventName) -> Option<&StoredEvent> {
        self.events.iter().find(|e| e.name == name)
    }

    /// Table position of a stored event
    pub fn event_index(&self, name: EventName) -> Option<usize> {
        self.events.iter().position(|e| e.name == name)
    }

    /// Append a new event with zeroed variables
    pub fn add_event(&mut self, name: EventName) -> Result<&mut StoredEvent, ModuleError> {
        if self.event_index(name).is_some() {
            return Err(ModuleError::DuplicateEvent(name));
        }
        if self.events.len() >= self.event_capacity() {
            return Err(ModuleError::EventTableFull {
                capacity: self.event_capacity(),
            });
        }
        self.events
            .push(StoredEvent::new(name, self.event_variable_count()));
        let last = self.events.len() - 1;
        Ok(&mut self.events[last])
    }

    /// The stored event named `name`, creating it if absent
    pub fn find_or_create_event(&mut self, name: EventName) -> Result<&mut StoredEvent, ModuleError> {
        match self.event_index(name) {
            Some(index) => Ok(&mut self.events[index]),
            None => self.add_event(name),
        }
    }

    /// Remove a stored event; returns whether it was present
    pub fn delete_event(&mut self, name: EventName) -> bool {
        let before = self.events.len();
        self.events.retain(|e| e.name != name);
        self.events.len() != before
    }

    /// Forget every stored event (NNCLR)
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Read variable `ev_index` of the event at `event_index`
    pub fn event_variable(&self, event_index: u8, ev_index: u8) -> Option<u8> {
        self.event_at(event_index)?.variable(ev_index)
    }

    /// Whether a match on the stored event at `event_index` is echoed back
    pub fn should_feedback(&self, event_index: usize) -> bool {
        self.module_type.feedback.allows(event_index)
    }

    pub fn is_in_setup(&self) -> bool {
        self.setup_mode
    }

    /// Enter setup mode, awaiting a node number
    pub fn start_setup(&mut self) {
        self.setup_mode = true;
    }

    pub fn end_setup(&mut self) {
        self.setup_mode = false;
    }
}
