//! Deterministic simulation harness for the Chorus services.
//!
//! Turmoil-backed implementations of [`Environment`](chorus_core::Environment)
//! and [`Listener`](chorus_core::Listener). The broker, proxy and reference
//! server run unchanged on top of them, with virtual time and a seeded RNG,
//! so liveness timeouts of tens of seconds complete instantly and every run
//! with the same seed replays the same interleaving.
//!
//! # Example
//!
//! ```rust,ignore
//! use chorus_harness::{SimEnv, SimListener};
//! use chorus_server::{ReferenceConfig, ReferenceService};
//!
//! let mut sim = turmoil::Builder::new().build();
//!
//! sim.host("reference", || async {
//!     let listener = SimListener::bind("0.0.0.0:5559").await?;
//!     ReferenceService::new(listener, SimEnv::new(), ReferenceConfig::default()).run().await?;
//!     Ok(())
//! });
//!
//! sim.client("server", async {
//!     let stream = chorus_harness::connect("reference:5559").await?;
//!     // Drive a ReferenceClient over `stream`...
//!     Ok(())
//! });
//!
//! sim.run().unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod sim_env;
mod sim_listener;

pub use sim_env::SimEnv;
pub use sim_listener::{CONNECT_ATTEMPTS, SimListener, connect};
