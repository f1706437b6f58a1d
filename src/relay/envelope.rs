use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::relay::topic::Topic;

/// Reserved top-level key holding receipt provenance.
pub const META_KEY: &str = "_meta";

/// Why a message was not forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("payload is empty")]
    Empty,

    #[error("payload is not a JSON object: {0}")]
    Malformed(String),
}

/// Provenance recorded for every forwarded notification.
#[derive(Debug, Serialize)]
pub struct Meta<'a> {
    pub time_received: String,
    pub broker: &'a str,
    pub topic: &'a str,
}

impl<'a> Meta<'a> {
    pub fn new(topic: &'a Topic, broker: &'a str, now: DateTime<Utc>) -> Self {
        Self {
            time_received: now.to_rfc3339_opts(SecondsFormat::Micros, true),
            broker,
            topic: topic.as_str(),
        }
    }
}

/// True for payloads that are empty or only whitespace.
pub fn is_blank(payload: &[u8]) -> bool {
    String::from_utf8_lossy(payload).trim().is_empty()
}

/// Adds (or overwrites) the `_meta` key of a JSON object payload.
///
/// `topic` is the topic the message arrived on, `broker` identifies the
/// source broker. Key order of the original object is kept and `_meta` is
/// appended, so wrapping an already wrapped payload only replaces its `_meta`.
pub fn wrap(
    payload: &[u8],
    topic: &Topic,
    broker: &str,
    now: DateTime<Utc>,
) -> Result<Vec<u8>, DropReason> {
    if is_blank(payload) {
        return Err(DropReason::Empty);
    }

    let mut object = match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(object)) => object,
        Ok(other) => {
            return Err(DropReason::Malformed(format!(
                "expected an object, found {}",
                json_kind(&other)
            )));
        }
        Err(e) => return Err(DropReason::Malformed(e.to_string())),
    };

    let meta = serde_json::to_value(Meta::new(topic, broker, now))
        .map_err(|e| DropReason::Malformed(e.to_string()))?;
    object.insert(META_KEY.to_string(), meta);

    serde_json::to_vec(&object).map_err(|e| DropReason::Malformed(e.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
