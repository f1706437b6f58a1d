//! The `error` module defines the error types used within the bridge.
//!
//! Only startup-phase errors are allowed to reach `main`; per-message failures
//! are contained by the relay dispatcher and surface through logs.

use thiserror::Error;

/// Errors raised while configuring, connecting or driving the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential lookup failed: {0}")]
    Credentials(String),

    #[error("connection to {broker} failed: {reason}")]
    Connection { broker: String, reason: String },

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: &'static str },
}

impl BridgeError {
    pub fn connection(broker: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connection {
            broker: broker.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
