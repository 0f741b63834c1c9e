//! Layout configuration
//!
//! The simulated bus is described by a list of modules, either the built-in
//! default or a JSON file:
//!
//! ```json
//! { "modules": [
//!     { "module_type": "CANACC5", "node_number": 300, "events": ["012D0001"] }
//! ] }
//! ```

use std::path::Path;

use cbus_protocol::{EventName, NodeNumber};
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::module::Module;
use crate::module_types::ModuleTypeDatabase;
use crate::registry::ModuleRegistry;

/// One module in a layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Type name from the module type database (e.g. "CANACC5")
    pub module_type: String,
    /// Initial node number
    pub node_number: NodeNumber,
    /// CAN id, cosmetic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_id: Option<u8>,
    /// Start in setup mode, awaiting SNN
    #[serde(default)]
    pub setup_mode: bool,
    /// Pre-taught events as 8-digit hex names
    #[serde(default)]
    pub events: Vec<String>,
}

impl ModuleConfig {
    pub fn new(module_type: impl Into<String>, node_number: NodeNumber) -> Self {
        Self {
            module_type: module_type.into(),
            node_number,
            can_id: None,
            setup_mode: false,
            events: Vec::new(),
        }
    }

    /// Builder-style pre-taught events
    pub fn with_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events = events.into_iter().map(Into::into).collect();
        self
    }

    /// Instantiate the module this entry describes
    pub fn build(&self) -> Result<Module, SimError> {
        let module_type = ModuleTypeDatabase::by_name(&self.module_type)
            .ok_or_else(|| SimError::UnknownModuleType(self.module_type.clone()))?;

        let mut module = Module::new(module_type, self.node_number);
        if let Some(can_id) = self.can_id {
            module.set_can_id(can_id);
        }
        for text in &self.events {
            let name: EventName = text.parse().map_err(|source| SimError::InvalidEvent {
                node_number: self.node_number,
                source,
            })?;
            module.add_event(name).map_err(|source| SimError::Module {
                node_number: self.node_number,
                source,
            })?;
        }
        if self.setup_mode {
            module.start_setup();
        }
        Ok(module)
    }
}

/// A whole simulated layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub modules: Vec<ModuleConfig>,
}

impl Default for LayoutConfig {
    /// A small layout: a producer whose events drive two servo and I/O
    /// boards that report back, plus plain accessory drivers and a panel.
    fn default() -> Self {
        Self {
            modules: vec![
                ModuleConfig::new("CANACC5", 300).with_events(["012D0001", "012D0002"]),
                ModuleConfig::new("CANACE8C", 301),
                ModuleConfig::new("CANSERVO8C", 302).with_events(["012D0001", "012D0002"]),
                ModuleConfig::new("CANMIO", 303).with_events(["00000064"]),
                ModuleConfig::new("CANPAN", 304).with_events(["012D0003"]),
                ModuleConfig::new("CANACC8", 305),
            ],
        }
    }
}

impl LayoutConfig {
    /// Parse a layout from JSON text
    pub fn from_json(text: &str) -> Result<Self, SimError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a layout from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let layout = Self::from_json(&text)?;
        tracing::info!(
            "Loaded layout with {} modules from {}",
            layout.modules.len(),
            path.display()
        );
        Ok(layout)
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build every module and register it
    pub fn build_registry(&self) -> Result<ModuleRegistry, SimError> {
        let mut registry = ModuleRegistry::new();
        for entry in &self.modules {
            registry.register(entry.build()?)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_builds() {
        let registry = LayoutConfig::default().build_registry().unwrap();
        assert_eq!(registry.len(), 6);
        let servo = registry.find(302).unwrap();
        assert_eq!(servo.module_type().name, "CANSERVO8C");
        assert_eq!(servo.event_count(), 2);
        assert_eq!(
            registry.find(303).unwrap().events()[0].name(),
            EventName::device(100)
        );
    }

    #[test]
    fn test_from_json_defaults() {
        let layout = LayoutConfig::from_json(
            r#"{"modules":[{"module_type":"CANACC4","node_number":7,"can_id":12,"setup_mode":true}]}"#,
        )
        .unwrap();
        let registry = layout.build_registry().unwrap();
        let module = registry.find(7).unwrap();
        assert_eq!(module.can_id(), 12);
        assert!(module.is_in_setup());
        assert_eq!(module.event_count(), 0);
    }

    #[test]
    fn test_json_roundtrip_of_default() {
        let layout = LayoutConfig::default();
        let text = layout.to_json().unwrap();
        assert_eq!(LayoutConfig::from_json(&text).unwrap(), layout);
    }

    #[test]
    fn test_unknown_module_type() {
        let layout = LayoutConfig {
            modules: vec![ModuleConfig::new("CANWHAT", 1)],
        };
        assert!(matches!(
            layout.build_registry(),
            Err(SimError::UnknownModuleType(name)) if name == "CANWHAT"
        ));
    }

    #[test]
    fn test_bad_event_name() {
        let layout = LayoutConfig {
            modules: vec![ModuleConfig::new("CANACC5", 1).with_events(["12345"])],
        };
        assert!(matches!(
            layout.build_registry(),
            Err(SimError::InvalidEvent { node_number: 1, .. })
        ));
    }

    #[test]
    fn test_duplicate_layout_event() {
        let layout = LayoutConfig {
            modules: vec![ModuleConfig::new("CANACC5", 1).with_events(["00010001", "00010001"])],
        };
        assert!(matches!(
            layout.build_registry(),
            Err(SimError::Module { node_number: 1, .. })
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            LayoutConfig::from_json("{\"modules\": 3}"),
            Err(SimError::Json(_))
        ));
    }
}
