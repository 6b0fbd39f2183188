//! Chorus coordination logic.
//!
//! Everything in this crate is sans-IO except [`transport`], which only knows
//! how to move one [`Multipart`](chorus_proto::Multipart) across an async byte
//! stream. The server crate wires these pieces to sockets.
//!
//! ## Architecture
//!
//! ```text
//! chorus-core
//!   ├─ LamportClock     (causal stamp carried by every envelope)
//!   ├─ Environment      (time + randomness, real or simulated)
//!   ├─ Registry         (rank assignment and liveness table)
//!   ├─ Reference        (reference service: bytes in, reply envelope out)
//!   ├─ BrokerRouter     (round-robin request routing state machine)
//!   ├─ SubscriptionSet  (topic prefix filter for fan-out)
//!   └─ transport        (Listener trait, read/write of multipart messages)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod env;
pub mod fanout;
pub mod reference;
pub mod registry;
pub mod routing;
pub mod transport;

pub use clock::LamportClock;
pub use env::{Environment, ManualEnv, ManualInstant};
pub use fanout::SubscriptionSet;
pub use reference::Reference;
pub use registry::{Eviction, RankAssignment, Registry, RegistryError};
pub use routing::{BrokerAction, BrokerEvent, BrokerRouter, PeerId, RouterStats};
pub use transport::{Listener, TransportError, read_message, write_message};
