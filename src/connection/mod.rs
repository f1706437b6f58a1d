//! The `connection` module owns the two broker sessions.
//!
//! Each session is driven by its own event loop and keeps its own state;
//! the only thing flowing between them is the dispatcher's publish call
//! carrying an immutable topic and payload.

pub mod backoff;
pub mod destination;
pub mod source;
pub mod state;
pub mod transport;

pub use destination::{Destination, DestinationConnection, LinkEvent, LinkMonitor};
pub use source::{SourceConnection, SourceSession, SubscriptionSink};
pub use state::ConnectionState;
pub use transport::SourceTransport;

#[cfg(test)]
pub(crate) mod fake_broker;
