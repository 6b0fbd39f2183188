//! Chorus network participants.
//!
//! These are the processes on the edges of the coordination core: request
//! clients and workers on either side of the broker, publishers and
//! subscribers on either side of the proxy, and servers registering with the
//! reference server. Each one stamps outgoing envelopes and observes inbound
//! clocks through a shared [`Participant`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod participant;
mod pubsub;
pub mod reference;
pub mod request;
mod worker;

pub use error::ClientError;
pub use participant::Participant;
pub use pubsub::{Event, Publisher, Subscriber};
pub use reference::ReferenceClient;
pub use request::RequestClient;
pub use worker::{PendingRequest, Worker};
