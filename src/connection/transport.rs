use std::fmt;

use rumqttc::Transport;

/// Port that selects MQTT over secure WebSocket.
pub const WEBSOCKET_PORT: u16 = 443;
/// The unencrypted MQTT port; anything else gets TLS.
pub const PLAIN_PORT: u16 = 1883;
/// Path the WebSocket endpoint is served on.
pub const WEBSOCKET_PATH: &str = "/mqtt";

/// How the bridge reaches the source broker, derived from the configured port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTransport {
    Tcp,
    Tls,
    SecureWebSocket,
}

impl SourceTransport {
    pub fn for_port(port: u16) -> Self {
        match port {
            WEBSOCKET_PORT => SourceTransport::SecureWebSocket,
            PLAIN_PORT => SourceTransport::Tcp,
            _ => SourceTransport::Tls,
        }
    }

    /// The broker address handed to the MQTT client. WebSocket transports
    /// expect a full URL rather than a bare host.
    pub fn broker_address(&self, host: &str, port: u16) -> String {
        match self {
            SourceTransport::SecureWebSocket => format!("wss://{host}:{port}{WEBSOCKET_PATH}"),
            SourceTransport::Tcp | SourceTransport::Tls => host.to_string(),
        }
    }

    /// TLS variants trust the platform root certificates.
    pub fn into_transport(self) -> Transport {
        match self {
            SourceTransport::Tcp => Transport::Tcp,
            SourceTransport::Tls => Transport::tls_with_default_config(),
            SourceTransport::SecureWebSocket => Transport::wss_with_default_config(),
        }
    }
}

impl fmt::Display for SourceTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceTransport::Tcp => "tcp",
            SourceTransport::Tls => "tls",
            SourceTransport::SecureWebSocket => "websockets",
        };
        f.write_str(name)
    }
}
