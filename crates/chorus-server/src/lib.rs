//! Chorus services.
//!
//! The three tiers of the coordination core, wired to TCP with tokio:
//!
//! ```text
//! chorus-server
//!   ├─ Broker            (request routing: clients 5555, workers 5556)
//!   ├─ Proxy             (broadcast fan-out: publishers 5557, subscribers 5558)
//!   ├─ ReferenceService  (ranks, heartbeats, liveness sweep: 5559)
//!   └─ SystemEnv         (production Environment impl)
//! ```
//!
//! Every service is generic over [`Listener`](chorus_core::Listener) and
//! [`Environment`](chorus_core::Environment), so the deterministic harness
//! runs the exact same accept loops over a simulated network.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod broker;
mod config;
mod connection;
mod error;
mod proxy;
mod reference;
mod system_env;

pub use broker::Broker;
pub use config::{BrokerConfig, ProxyConfig, ReferenceConfig};
pub use error::ServerError;
pub use proxy::Proxy;
pub use reference::ReferenceService;
pub use system_env::SystemEnv;
