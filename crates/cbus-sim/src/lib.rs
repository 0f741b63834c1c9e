//! CBUS Module Simulation Library
//!
//! This crate simulates the modules on a CBUS network so that configuration
//! tools can be exercised without physical hardware. It includes:
//!
//! - **ModuleTypeDatabase**: static descriptors of the supported module types
//! - **Module**: parameters, node variables and taught events of one module
//! - **Dispatcher**: applies inbound frames and produces the modules' replies
//! - **LayoutConfig**: the set of modules on the simulated bus
//!
//! # Example
//!
//! ```rust
//! use cbus_protocol::EncodeFrame;
//! use cbus_sim::{Dispatcher, LayoutConfig, NetworkState};
//!
//! let registry = LayoutConfig::default().build_registry().unwrap();
//! let mut dispatcher = Dispatcher::new(NetworkState::new(registry));
//!
//! // Ask every node to identify itself
//! for frame in dispatcher.handle_text(":SB780N0D;") {
//!     println!("{}", frame.encode());
//! }
//! ```

pub mod dispatcher;
pub mod error;
pub mod layout;
pub mod module;
pub mod module_types;
pub mod network;
pub mod registry;

pub use dispatcher::{AccessoryKind, Dispatcher};
pub use error::{ModuleError, SimError};
pub use layout::{LayoutConfig, ModuleConfig};
pub use module::{Module, StoredEvent};
pub use module_types::{FeedbackPolicy, ModuleType, ModuleTypeDatabase};
pub use network::NetworkState;
pub use registry::ModuleRegistry;
