//! Service configuration.
//!
//! Defaults match the reference deployment's ports and timings.

use std::time::Duration;

use chorus_core::{registry::DEFAULT_TIMEOUT, routing::DEFAULT_MAX_PENDING};

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Address request clients connect to
    pub frontend: String,
    /// Address workers connect to
    pub backend: String,
    /// Requests queued while no worker is connected
    pub max_pending: usize,
    /// Messages buffered per connection before new ones are dropped
    pub outbox_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            frontend: "0.0.0.0:5555".to_string(),
            backend: "0.0.0.0:5556".to_string(),
            max_pending: DEFAULT_MAX_PENDING,
            outbox_capacity: 256,
        }
    }
}

/// Proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address publishers connect to
    pub frontend: String,
    /// Address subscribers connect to
    pub backend: String,
    /// Publications buffered for slow subscribers before they lag
    pub buffer: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            frontend: "0.0.0.0:5557".to_string(),
            backend: "0.0.0.0:5558".to_string(),
            buffer: 1024,
        }
    }
}

/// Reference server configuration.
#[derive(Debug, Clone)]
pub struct ReferenceConfig {
    /// Request/reply address
    pub bind: String,
    /// Period of the liveness sweep
    pub sweep_interval: Duration,
    /// Silence after which a server is evicted
    pub timeout: Duration,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5559".to_string(),
            sweep_interval: Duration::from_secs(10),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ReferenceConfig {
    /// Reject settings under which no server could stay registered.
    pub fn validate(&self) -> Result<(), crate::ServerError> {
        if self.sweep_interval.is_zero() {
            return Err(crate::ServerError::Config("sweep interval must be positive".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(crate::ServerError::Config("liveness timeout must be positive".to_string()));
        }
        Ok(())
    }
}
