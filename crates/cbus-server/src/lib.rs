//! CBUS Network Simulator Server
//!
//! This crate serves a simulated CBUS network to GridConnect clients over
//! TCP. Any number of clients may connect; every frame the simulated modules
//! send is broadcast to all of them.
//!
//! # Architecture
//!
//! - One task per client reads and splits frames, and writes broadcasts back
//! - One actor owns the simulated modules and handles frames in arrival order
//! - A [`SimulatorHandle`] lets tests and embedding code inject frames and
//!   inspect what clients sent
//!
//! # Example
//!
//! ```rust,no_run
//! use cbus_server::{ServerConfig, SimulatorServer};
//! use cbus_sim::LayoutConfig;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = LayoutConfig::default().build_registry()?;
//! let config = ServerConfig { port: 0, ..Default::default() };
//! let handle = SimulatorServer::start(config, registry).await?;
//!
//! handle.emit_kloc(1).await?;
//! println!("clients sent: {:?}", handle.received_frames().await?);
//! handle.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod config;
pub mod connection;
pub mod error;
pub mod server;

pub use actor::{run_sim_actor, ConnectionId, SimCommand};
pub use config::{ServerConfig, DEFAULT_PORT};
pub use error::ServerError;
pub use server::{SimulatorHandle, SimulatorServer};
