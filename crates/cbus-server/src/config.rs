//! Server configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use cbus_sim::LayoutConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// Default GridConnect TCP port
pub const DEFAULT_PORT: u16 = 5550;

/// Configuration for [`SimulatorServer`](crate::SimulatorServer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind_address: IpAddr,
    /// TCP port; 0 picks a free one
    pub port: u16,
    /// Outbound frames buffered per client before a slow client lags
    pub broadcast_capacity: usize,
    /// Inbound frames queued for the simulator across all clients
    pub inbound_capacity: usize,
    /// Received frames kept for inspection; the oldest are dropped past this
    pub received_log_capacity: usize,
    /// JSON layout file; the built-in layout when unset
    pub layout_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            broadcast_capacity: 1024,
            inbound_capacity: 256,
            received_log_capacity: 65536,
            layout_path: None,
        }
    }
}

impl ServerConfig {
    /// Listen address
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Load a configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise fail when the server starts
    pub fn validate(&self) -> Result<()> {
        if self.broadcast_capacity == 0 {
            return Err(ServerError::InvalidConfig(
                "broadcast_capacity must be at least 1".into(),
            ));
        }
        if self.inbound_capacity == 0 {
            return Err(ServerError::InvalidConfig(
                "inbound_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The layout to simulate
    pub fn layout(&self) -> Result<LayoutConfig> {
        match &self.layout_path {
            Some(path) => Ok(LayoutConfig::load(path)?),
            None => Ok(LayoutConfig::default()),
        }
    }
}
