use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::relay::envelope::{self, DropReason};
use crate::relay::message::Message;
use crate::relay::topic::Topic;
use crate::utils::Result;

/// Accepts outbound notifications for the destination broker.
///
/// `publish` must only enqueue: it runs on the source connection's event
/// loop and may not wait on the network.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &Topic, payload: Vec<u8>) -> Result<()>;
}

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    fn publish(&self, topic: &Topic, payload: Vec<u8>) -> Result<()> {
        (**self).publish(topic, payload)
    }
}

/// What happened to a single relayed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Forwarded { topic: Topic },
    Dropped(DropReason),
    PublishFailed,
}

/// Per-message handler: rewrites the topic, wraps the payload and forwards
/// it to the destination.
///
/// Every failure is contained here; nothing a single message does can stop
/// the bridge.
#[derive(Debug)]
pub struct Dispatcher<P> {
    publisher: P,
    broker_id: String,
}

impl<P: Publisher> Dispatcher<P> {
    /// `broker_id` is recorded as the `broker` field of every envelope.
    pub fn new(publisher: P, broker_id: impl Into<String>) -> Self {
        Self {
            publisher,
            broker_id: broker_id.into(),
        }
    }

    pub fn broker_id(&self) -> &str {
        &self.broker_id
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn on_message(&self, message: &Message) -> Outcome {
        self.dispatch_at(message, Utc::now())
    }

    /// Same as [`Dispatcher::on_message`] with an explicit receipt time.
    pub fn dispatch_at(&self, message: &Message, now: DateTime<Utc>) -> Outcome {
        if envelope::is_blank(&message.payload) {
            debug!("discarding empty message published on {}", message.topic);
            return Outcome::Dropped(DropReason::Empty);
        }

        let new_topic = message.topic.rewrite();

        let wrapped = match envelope::wrap(&message.payload, &message.topic, &self.broker_id, now) {
            Ok(wrapped) => wrapped,
            Err(reason) => {
                error!(
                    topic = %message.topic,
                    "cannot forward message: {} | {}",
                    reason,
                    String::from_utf8_lossy(&message.payload)
                );
                return Outcome::Dropped(reason);
            }
        };

        debug!(
            "publishing topic {} ({} levels in) with message length {}",
            new_topic,
            message.topic.levels().count(),
            wrapped.len()
        );

        match self.publisher.publish(&new_topic, wrapped) {
            Ok(()) => Outcome::Forwarded { topic: new_topic },
            Err(e) => {
                error!(topic = %new_topic, "failed to publish to destination: {}", e);
                Outcome::PublishFailed
            }
        }
    }
}
