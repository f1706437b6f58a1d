use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::connection::backoff::Backoff;
use crate::relay::topic::SubscriptionSet;
use crate::utils::{BridgeError, Result};

/// Top-level configuration settings for the bridge.
///
/// Read once at startup and never changed afterwards.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub source: SourceSettings,
    pub destination: DestinationSettings,
    pub bridge: BridgeSettings,
    pub log: LogSettings,
}

/// The public broker notifications are read from.
#[derive(Deserialize, Clone)]
pub struct SourceSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topics: Vec<String>,
    pub client_id_prefix: String,
    pub keep_alive_secs: u64,
    pub clean_session: bool,
}

/// The private broker notifications are relayed to.
#[derive(Deserialize, Clone)]
pub struct DestinationSettings {
    pub endpoint: String,
    pub port: u16,
    /// Identifier resolved to a PEM certificate through the secrets service.
    pub cert_id: String,
    /// PEM private key matching the certificate, supplied inline.
    pub private_key: String,
    pub ca_file: PathBuf,
    pub region: Option<String>,
    pub keep_alive_secs: u64,
}

/// Operational knobs shared by both connections.
#[derive(Debug, Deserialize, Clone)]
pub struct BridgeSettings {
    pub drain_grace_secs: u64,
    pub request_capacity: usize,
    pub backoff_initial_ms: u64,
    pub backoff_max_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
    pub file: Option<PathBuf>,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub source: Option<PartialSourceSettings>,
    pub destination: Option<PartialDestinationSettings>,
    pub bridge: Option<PartialBridgeSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialSourceSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topics: Option<Vec<String>>,
    pub client_id_prefix: Option<String>,
    pub keep_alive_secs: Option<u64>,
    pub clean_session: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialDestinationSettings {
    pub endpoint: Option<String>,
    pub port: Option<u16>,
    pub cert_id: Option<String>,
    pub private_key: Option<String>,
    pub ca_file: Option<PathBuf>,
    pub region: Option<String>,
    pub keep_alive_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBridgeSettings {
    pub drain_grace_secs: Option<u64>,
    pub request_capacity: Option<usize>,
    pub backoff_initial_ms: Option<u64>,
    pub backoff_max_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source: SourceSettings {
                host: String::new(),
                port: 8883,
                username: None,
                password: None,
                topics: vec!["cache/a/wis2/#".to_string()],
                client_id_prefix: "wis2bridge-".to_string(),
                keep_alive_secs: 60,
                clean_session: false,
            },
            destination: DestinationSettings {
                endpoint: String::new(),
                port: 8883,
                cert_id: String::new(),
                private_key: String::new(),
                ca_file: PathBuf::from("cas/AmazonRootCA1.pem"),
                region: None,
                keep_alive_secs: 60,
            },
            bridge: BridgeSettings {
                drain_grace_secs: 5,
                request_capacity: 1000,
                backoff_initial_ms: 500,
                backoff_max_secs: 30,
            },
            log: LogSettings {
                level: "info".to_string(),
                file: None,
            },
        }
    }
}

impl PartialSettings {
    /// Merges what was loaded over the defaults.
    pub fn merge(self, default: Settings) -> Settings {
        let source = self.source.unwrap_or_default();
        let destination = self.destination.unwrap_or_default();
        let bridge = self.bridge.unwrap_or_default();
        let log = self.log.unwrap_or_default();

        Settings {
            source: SourceSettings {
                host: source.host.unwrap_or(default.source.host),
                port: source.port.unwrap_or(default.source.port),
                username: source.username.or(default.source.username),
                password: source.password.or(default.source.password),
                topics: source.topics.unwrap_or(default.source.topics),
                client_id_prefix: source
                    .client_id_prefix
                    .unwrap_or(default.source.client_id_prefix),
                keep_alive_secs: source
                    .keep_alive_secs
                    .unwrap_or(default.source.keep_alive_secs),
                clean_session: source
                    .clean_session
                    .unwrap_or(default.source.clean_session),
            },
            destination: DestinationSettings {
                endpoint: destination.endpoint.unwrap_or(default.destination.endpoint),
                port: destination.port.unwrap_or(default.destination.port),
                cert_id: destination.cert_id.unwrap_or(default.destination.cert_id),
                private_key: destination
                    .private_key
                    .unwrap_or(default.destination.private_key),
                ca_file: destination.ca_file.unwrap_or(default.destination.ca_file),
                region: destination.region.or(default.destination.region),
                keep_alive_secs: destination
                    .keep_alive_secs
                    .unwrap_or(default.destination.keep_alive_secs),
            },
            bridge: BridgeSettings {
                drain_grace_secs: bridge
                    .drain_grace_secs
                    .unwrap_or(default.bridge.drain_grace_secs),
                request_capacity: bridge
                    .request_capacity
                    .unwrap_or(default.bridge.request_capacity),
                backoff_initial_ms: bridge
                    .backoff_initial_ms
                    .unwrap_or(default.bridge.backoff_initial_ms),
                backoff_max_secs: bridge
                    .backoff_max_secs
                    .unwrap_or(default.bridge.backoff_max_secs),
            },
            log: LogSettings {
                level: log.level.unwrap_or(default.log.level),
                file: log.file.or(default.log.file),
            },
        }
    }
}

impl Settings {
    /// Checks everything startup depends on and returns the parsed
    /// subscription set.
    pub fn validate(&self) -> Result<SubscriptionSet> {
        require("source.host", &self.source.host)?;
        require("destination.endpoint", &self.destination.endpoint)?;
        require("destination.cert_id", &self.destination.cert_id)?;
        require("destination.private_key", &self.destination.private_key)?;

        if self.source.keep_alive_secs == 0 || self.destination.keep_alive_secs == 0 {
            return Err(BridgeError::InvalidConfig(
                "keep_alive_secs must be at least 1".to_string(),
            ));
        }
        if self.bridge.request_capacity == 0 {
            return Err(BridgeError::InvalidConfig(
                "bridge.request_capacity must be at least 1".to_string(),
            ));
        }

        SubscriptionSet::parse(&self.source.topics)
    }
}

impl SourceSettings {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

impl DestinationSettings {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

impl BridgeSettings {
    pub fn drain_grace(&self) -> Duration {
        Duration::from_secs(self.drain_grace_secs)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.backoff_initial_ms),
            Duration::from_secs(self.backoff_max_secs),
        )
    }
}

fn require(key: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BridgeError::InvalidConfig(format!("{key} must be set")));
    }
    Ok(())
}

fn redacted(value: &Option<String>) -> &'static str {
    match value {
        Some(_) => "<redacted>",
        None => "<unset>",
    }
}

impl fmt::Debug for SourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("topics", &self.topics)
            .field("client_id_prefix", &self.client_id_prefix)
            .field("keep_alive_secs", &self.keep_alive_secs)
            .field("clean_session", &self.clean_session)
            .finish()
    }
}

impl fmt::Debug for DestinationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationSettings")
            .field("endpoint", &self.endpoint)
            .field("port", &self.port)
            .field("cert_id", &self.cert_id)
            .field("private_key", &"<redacted>")
            .field("ca_file", &self.ca_file)
            .field("region", &self.region)
            .field("keep_alive_secs", &self.keep_alive_secs)
            .finish()
    }
}
