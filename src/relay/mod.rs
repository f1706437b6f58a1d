//! The `relay` module holds the per-message half of the bridge: topic
//! handling, the provenance envelope and the dispatcher that ties them
//! together and hands the result to the destination.

pub mod dispatcher;
pub mod envelope;
pub mod message;
pub mod topic;

pub use dispatcher::{Dispatcher, Outcome, Publisher};
pub use envelope::{DropReason, META_KEY};
pub use message::Message;
pub use topic::{SubscriptionSet, Topic, TopicFilter};
