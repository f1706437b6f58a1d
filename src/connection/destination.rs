use std::fmt::Display;
use std::sync::Mutex;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnAck, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions,
    Outgoing, Packet, QoS, TlsConfiguration, Transport,
};
use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{BridgeSettings, DestinationSettings};
use crate::connection::backoff::Backoff;
use crate::connection::state::ConnectionState;
use crate::credentials::CredentialMaterial;
use crate::relay::{Publisher, Topic};
use crate::utils::{BridgeError, Result};

/// Upper bound on waiting for the driver task after requesting disconnect.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Link events kept for slow observers before they start lagging.
const LINK_EVENT_CAPACITY: usize = 16;

/// Observability notifications of the destination link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Interrupted(String),
    Resumed { session_present: bool },
}

/// Tracks the destination link and reports interruptions and resumptions.
///
/// Only one notification is emitted per outage, however many reconnect
/// attempts it takes. Notifications are broadcast to every subscriber and
/// dropped when nobody listens.
#[derive(Debug)]
pub struct LinkMonitor {
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<LinkEvent>,
    interrupted: bool,
}

impl LinkMonitor {
    pub fn channel() -> (Self, watch::Receiver<ConnectionState>) {
        let (state, rx) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(LINK_EVENT_CAPACITY);
        (
            Self {
                state,
                events,
                interrupted: false,
            },
            rx,
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: LinkEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn on_connecting(&mut self) {
        self.state.send_replace(ConnectionState::Connecting);
    }

    pub fn on_connack(&mut self, ack: &ConnAck) {
        if !matches!(ack.code, ConnectReturnCode::Success) {
            self.on_error(&format!("connection refused: {:?}", ack.code));
            return;
        }

        self.state.send_replace(ConnectionState::Ready);
        if !self.interrupted {
            return;
        }
        self.interrupted = false;
        info!(
            "destination connection resumed. session_present: {}",
            ack.session_present
        );
        self.notify(LinkEvent::Resumed {
            session_present: ack.session_present,
        });
    }

    pub fn on_error(&mut self, error: &dyn Display) {
        self.state.send_replace(ConnectionState::Disconnected);
        if self.interrupted {
            debug!("destination still unreachable: {}", error);
            return;
        }
        self.interrupted = true;
        warn!("destination connection interrupted. error: {}", error);
        self.notify(LinkEvent::Interrupted(error.to_string()));
    }

    pub fn on_disconnected(&mut self) {
        self.state.send_replace(ConnectionState::Disconnected);
    }
}

/// Publishing session against the private broker, authenticated with
/// mutual TLS.
///
/// The event loop runs on its own task; `publish` only enqueues onto the
/// client's bounded request channel.
#[derive(Debug)]
pub struct DestinationConnection {
    client: AsyncClient,
    endpoint: String,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<LinkEvent>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// The publishing end of the bridge as seen by the lifecycle controller.
#[async_trait]
pub trait Destination: Publisher {
    /// Closes the session once in-flight publishes had their chance.
    /// Must be idempotent.
    async fn disconnect(&self);
}

impl DestinationConnection {
    /// Connects and waits for the initial handshake. Any failure here is
    /// fatal for startup; later outages are retried by the driver task.
    pub async fn connect(
        settings: &DestinationSettings,
        client_id: &str,
        credentials: &CredentialMaterial,
        bridge: &BridgeSettings,
    ) -> Result<Self> {
        info!("creating destination connection to {}", settings.endpoint);

        let tls = TlsConfiguration::Simple {
            ca: credentials.ca_pem.clone(),
            alpn: None,
            client_auth: Some((
                credentials.certificate_pem.clone(),
                credentials.private_key_pem.clone(),
            )),
        };
        let mut options = MqttOptions::new(client_id, &settings.endpoint, settings.port);
        options
            .set_keep_alive(settings.keep_alive())
            .set_transport(Transport::tls_with_config(tls));

        let (client, mut eventloop) = AsyncClient::new(options, bridge.request_capacity);
        let (mut monitor, state) = LinkMonitor::channel();
        monitor.on_connecting();

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if !matches!(ack.code, ConnectReturnCode::Success) {
                        return Err(BridgeError::connection(
                            &settings.endpoint,
                            format!("{:?}", ack.code),
                        ));
                    }
                    monitor.on_connack(&ack);
                    break;
                }
                Ok(_) => {}
                Err(e) => return Err(BridgeError::connection(&settings.endpoint, e)),
            }
        }
        info!("connected to destination broker {}", settings.endpoint);

        let events = monitor.events.clone();
        let driver = tokio::spawn(drive(eventloop, monitor, bridge.backoff()));

        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            state,
            events,
            driver: Mutex::new(Some(driver)),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Interrupted and resumed notifications of the link.
    pub fn link_events(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl Destination for DestinationConnection {
    /// Requests a clean disconnect and waits for the driver task to finish.
    async fn disconnect(&self) {
        let driver = match self.driver.lock() {
            Ok(mut driver) => driver.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(driver) = driver else {
            return;
        };

        if let Err(e) = self.client.try_disconnect() {
            warn!("cannot request disconnect from {}: {}", self.endpoint, e);
        }

        let abort = driver.abort_handle();
        match tokio::time::timeout(DISCONNECT_TIMEOUT, driver).await {
            Ok(_) => info!("disconnected from destination broker {}", self.endpoint),
            Err(_) => {
                warn!("destination driver did not stop in time, aborting");
                abort.abort();
            }
        }
    }
}

impl Publisher for DestinationConnection {
    fn publish(&self, topic: &Topic, payload: Vec<u8>) -> Result<()> {
        self.client
            .try_publish(topic.as_str(), QoS::AtLeastOnce, false, payload)
            .map_err(|e| BridgeError::Publish(e.to_string()))
    }
}

/// Polls the destination event loop until a disconnect is flushed,
/// reconnecting with backoff after every failure.
async fn drive(mut eventloop: EventLoop, mut monitor: LinkMonitor, mut backoff: Backoff) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                backoff.reset();
                monitor.on_connack(&ack);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                monitor.on_disconnected();
                break;
            }
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => {
                monitor.on_disconnected();
                break;
            }
            Err(e) => {
                monitor.on_error(&e);
                tokio::time::sleep(backoff.next_delay()).await;
            }
        }
    }
}
