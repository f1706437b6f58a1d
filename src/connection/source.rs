use std::fmt::Display;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnAck, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet,
    Publish, QoS, SubAck, SubscribeFilter, SubscribeReasonCode,
};
use tracing::{debug, error, info, warn};

use crate::bridge::shutdown::ShutdownSignal;
use crate::config::{BridgeSettings, SourceSettings};
use crate::connection::backoff::Backoff;
use crate::connection::state::ConnectionState;
use crate::connection::transport::SourceTransport;
use crate::relay::{Dispatcher, Message, Outcome, Publisher, SubscriptionSet, Topic};
use crate::utils::{BridgeError, Result};

/// Upper bound on flushing the DISCONNECT packet during shutdown.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Where subscription requests for the source broker are sent.
///
/// `subscribe_all` is called from the event loop's own task and must only
/// enqueue the request.
pub trait SubscriptionSink {
    fn subscribe_all(&self, subscriptions: &SubscriptionSet) -> Result<()>;
}

impl SubscriptionSink for AsyncClient {
    fn subscribe_all(&self, subscriptions: &SubscriptionSet) -> Result<()> {
        let filters = subscriptions
            .filters()
            .iter()
            .map(|f| SubscribeFilter::new(f.as_str().to_string(), QoS::AtLeastOnce));
        self.try_subscribe_many(filters)
            .map_err(|e| BridgeError::Subscribe(e.to_string()))
    }
}

/// Reacts to events of the source session.
///
/// Owns the subscription set and the connection state. Every accepted
/// CONNACK, the first one included, re-issues the whole subscription set
/// as a single request, since the broker may not have kept the session.
#[derive(Debug)]
pub struct SourceSession<S> {
    sink: S,
    subscriptions: SubscriptionSet,
    state: ConnectionState,
    connections: u64,
}

impl<S: SubscriptionSink> SourceSession<S> {
    pub fn new(sink: S, subscriptions: SubscriptionSet) -> Self {
        Self {
            sink,
            subscriptions,
            state: ConnectionState::Disconnected,
            connections: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Number of accepted connections so far.
    pub fn connections(&self) -> u64 {
        self.connections
    }

    pub fn on_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Returns false if the broker refused the connection.
    pub fn on_connack(&mut self, ack: &ConnAck) -> bool {
        if !matches!(ack.code, ConnectReturnCode::Success) {
            error!("source broker refused connection: {:?}", ack.code);
            self.state = ConnectionState::Disconnected;
            return false;
        }

        self.connections += 1;
        if self.connections == 1 {
            info!(
                "connected to source broker (session_present: {})",
                ack.session_present
            );
        } else {
            info!(
                "connection to source broker resumed (session_present: {})",
                ack.session_present
            );
        }
        self.state = ConnectionState::Connected;

        for filter in self.subscriptions.filters() {
            info!("subscribing to: {}", filter);
        }
        match self.sink.subscribe_all(&self.subscriptions) {
            Ok(()) => self.state = ConnectionState::Subscribing,
            Err(e) => error!("cannot subscribe to source topics: {}", e),
        }
        true
    }

    pub fn on_suback(&mut self, ack: &SubAck) {
        info!("subscription acknowledged (pkid {})", ack.pkid);
        for (filter, code) in self.subscriptions.filters().iter().zip(&ack.return_codes) {
            if matches!(code, SubscribeReasonCode::Failure) {
                error!("server rejected subscription to topic: {}", filter);
            }
        }
        self.state = ConnectionState::Ready;
    }

    /// Hands a received message to the dispatcher unless its topic falls
    /// outside the subscription set.
    pub fn on_publish<P: Publisher>(
        &self,
        publish: &Publish,
        dispatcher: &Dispatcher<P>,
    ) -> Option<Outcome> {
        debug!("message received with topic {}", publish.topic);

        let topic = match Topic::parse(&publish.topic) {
            Ok(topic) => topic,
            Err(e) => {
                warn!("ignoring message: {}", e);
                return None;
            }
        };
        if !self.subscriptions.matches(&topic) {
            debug!("ignoring message on unsubscribed topic {}", topic);
            return None;
        }

        Some(dispatcher.on_message(&Message::new(topic, publish.payload.clone())))
    }

    pub fn on_connection_lost(&mut self, error: &dyn Display) {
        if self.state == ConnectionState::Disconnected {
            debug!("source broker still unreachable: {}", error);
        } else {
            warn!("connection to source broker has been lost: {}", error);
        }
        self.state = ConnectionState::Disconnected;
    }

    pub fn on_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    pub fn handle_event<P: Publisher>(
        &mut self,
        event: &Event,
        dispatcher: &Dispatcher<P>,
    ) -> Option<Outcome> {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                self.on_connack(ack);
                None
            }
            Event::Incoming(Packet::SubAck(ack)) => {
                self.on_suback(ack);
                None
            }
            Event::Incoming(Packet::Publish(publish)) => self.on_publish(publish, dispatcher),
            _ => None,
        }
    }
}

/// Subscribing session against the public broker.
pub struct SourceConnection {
    client: AsyncClient,
    eventloop: EventLoop,
    session: SourceSession<AsyncClient>,
    backoff: Backoff,
    broker: String,
    stopped: bool,
}

impl SourceConnection {
    /// Prepares the session. No network traffic happens until
    /// [`SourceConnection::connect`].
    pub fn new(
        settings: &SourceSettings,
        client_id: &str,
        subscriptions: SubscriptionSet,
        bridge: &BridgeSettings,
    ) -> Self {
        let transport = SourceTransport::for_port(settings.port);
        let broker = format!("{}:{}", settings.host, settings.port);
        info!(
            "creating source connection to {} as {} over {}",
            broker,
            settings.username.as_deref().unwrap_or("<anonymous>"),
            transport
        );

        let mut options = MqttOptions::new(
            client_id,
            transport.broker_address(&settings.host, settings.port),
            settings.port,
        );
        options
            .set_keep_alive(settings.keep_alive())
            .set_clean_session(settings.clean_session)
            .set_transport(transport.into_transport());
        if let Some(username) = &settings.username {
            options.set_credentials(username, settings.password.as_deref().unwrap_or_default());
        }

        Self::with_options(options, broker, subscriptions, bridge.request_capacity, bridge.backoff())
    }

    /// Builds the session from ready-made client options.
    pub(crate) fn with_options(
        options: MqttOptions,
        broker: impl Into<String>,
        subscriptions: SubscriptionSet,
        request_capacity: usize,
        backoff: Backoff,
    ) -> Self {
        let (client, eventloop) = AsyncClient::new(options, request_capacity);
        let session = SourceSession::new(client.clone(), subscriptions);

        Self {
            client,
            eventloop,
            session,
            backoff,
            broker: broker.into(),
            stopped: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Waits for the first CONNACK, which also issues the subscriptions.
    /// Failing here aborts startup.
    pub async fn connect(&mut self) -> Result<()> {
        self.session.on_connecting();
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if self.session.on_connack(&ack) {
                        return Ok(());
                    }
                    return Err(BridgeError::connection(&self.broker, format!("{:?}", ack.code)));
                }
                Ok(_) => {}
                Err(e) => {
                    self.session.on_connection_lost(&e);
                    return Err(BridgeError::connection(&self.broker, e));
                }
            }
        }
    }

    /// Drives the session until `shutdown` fires, dispatching every received
    /// message inline. Connection loss is retried forever with backoff.
    pub async fn run<P: Publisher>(
        &mut self,
        dispatcher: &Dispatcher<P>,
        shutdown: &mut ShutdownSignal,
    ) {
        let Self {
            eventloop,
            session,
            backoff,
            broker,
            ..
        } = self;

        loop {
            let polled = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                polled = eventloop.poll() => polled,
            };

            match polled {
                Ok(event) => {
                    if matches!(event, Event::Incoming(Packet::ConnAck(_))) {
                        backoff.reset();
                    }
                    session.handle_event(&event, dispatcher);
                }
                Err(e) => {
                    session.on_connection_lost(&e);
                    let delay = backoff.next_delay();
                    debug!("reconnecting to {} in {:?} (attempt {})", broker, delay, backoff.attempts());

                    let stop = tokio::select! {
                        biased;
                        _ = shutdown.wait() => true,
                        _ = tokio::time::sleep(delay) => false,
                    };
                    if stop {
                        break;
                    }
                    session.on_connecting();
                }
            }
        }

        info!("source run loop stopped");
    }

    /// Sends DISCONNECT and waits briefly for it to be flushed. Idempotent.
    ///
    /// Messages the event loop already acknowledged to the broker, and any
    /// arriving while the DISCONNECT is flushed, are still dispatched: the
    /// broker will not redeliver them.
    pub async fn stop<P: Publisher>(&mut self, dispatcher: &Dispatcher<P>) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        let Self {
            client,
            eventloop,
            session,
            broker,
            ..
        } = self;

        if let Err(e) = client.try_disconnect() {
            warn!("cannot request disconnect from {}: {}", broker, e);
        } else {
            let mut drained = 0usize;
            let flush = async {
                loop {
                    match eventloop.poll().await {
                        Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            session.on_publish(&publish, dispatcher);
                            drained += 1;
                        }
                        Ok(_) => {}
                    }
                }
            };
            if tokio::time::timeout(DISCONNECT_TIMEOUT, flush).await.is_err() {
                warn!("disconnect from {} was not flushed in time", broker);
            }
            if drained > 0 {
                info!("dispatched {} messages received during shutdown", drained);
            }
        }

        session.on_disconnected();
        info!("disconnected from source broker {}", broker);
    }
}
