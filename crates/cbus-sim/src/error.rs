//! Error types for the simulation layer

use cbus_protocol::{EventName, NodeNumber, ParseError};
use thiserror::Error;

/// Rejections from a module's own tables
///
/// The dispatcher maps these onto CMDERR codes; none of them abort the
/// simulator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    /// Index past the end of a variable or parameter table
    #[error("{table} index {index} out of range (length {len})")]
    IndexOutOfRange {
        table: &'static str,
        index: usize,
        len: usize,
    },

    /// Event table already holds `capacity` events
    #[error("event table full ({capacity} events)")]
    EventTableFull { capacity: usize },

    /// Event already stored
    #[error("event {0} already stored")]
    DuplicateEvent(EventName),
}

/// Errors building or loading a simulated layout
#[derive(Debug, Error)]
pub enum SimError {
    /// Module type name not in the database
    #[error("unknown module type: {0}")]
    UnknownModuleType(String),

    /// Two modules claim the same node number
    #[error("node number already registered: {0}")]
    DuplicateNodeNumber(NodeNumber),

    /// Layout event is not an 8-digit hex event name
    #[error("invalid event for node {node_number}: {source}")]
    InvalidEvent {
        node_number: NodeNumber,
        #[source]
        source: ParseError,
    },

    /// Layout entry violates a module table limit
    #[error("module {node_number}: {source}")]
    Module {
        node_number: NodeNumber,
        #[source]
        source: ModuleError,
    },

    /// I/O error reading a layout file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed layout JSON
    #[error("layout parse error: {0}")]
    Json(#[from] serde_json::Error),
}
