use bytes::Bytes;

use crate::relay::topic::Topic;

/// A notification received from the source broker.
///
/// Created on receipt, handed to the dispatcher by reference and dropped
/// once forwarded. The payload is opaque to the bridge apart from the
/// envelope it gets wrapped in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: Topic,
    pub payload: Bytes,
}

impl Message {
    pub fn new(topic: Topic, payload: impl Into<Bytes>) -> Self {
        Self {
            topic,
            payload: payload.into(),
        }
    }
}
