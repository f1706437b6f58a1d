//! The `bridge` module is the lifecycle controller. It wires the two
//! connections together at startup and runs the ordered drain on shutdown.

pub mod shutdown;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tracing::info;

use crate::config::Settings;
use crate::connection::{Destination, DestinationConnection, SourceConnection};
use crate::credentials::{self, CertificateStore};
use crate::relay::Dispatcher;
use crate::utils::Result;

use shutdown::ShutdownSignal;

/// Length of the random suffix appended to the client id prefix.
pub const CLIENT_ID_SUFFIX_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Appends a random lowercase suffix so redeployments never collide on the
/// broker side.
pub fn generate_client_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..CLIENT_ID_SUFFIX_LEN)
        .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
        .collect();
    format!("{prefix}{suffix}")
}

/// The running bridge: both connections plus the dispatcher joining them.
pub struct Bridge<D: Destination = DestinationConnection> {
    state: watch::Sender<LifecycleState>,
    client_id: String,
    source: SourceConnection,
    destination: Arc<D>,
    dispatcher: Dispatcher<Arc<D>>,
    drain_grace: Duration,
}

impl Bridge {
    /// Acquires credentials, opens the destination and then the source
    /// (which subscribes on connect). Any error is fatal for the process.
    pub async fn start<S: CertificateStore + ?Sized>(settings: &Settings, store: &S) -> Result<Self> {
        let subscriptions = settings.validate()?;
        let client_id = generate_client_id(&settings.source.client_id_prefix);
        info!("starting bridge as {}", client_id);

        let material = credentials::acquire(store, &settings.destination).await?;

        info!("creating connection to destination");
        let destination = Arc::new(
            DestinationConnection::connect(
                &settings.destination,
                &client_id,
                &material,
                &settings.bridge,
            )
            .await?,
        );

        info!("creating connection to source");
        let mut source = SourceConnection::new(
            &settings.source,
            &client_id,
            subscriptions,
            &settings.bridge,
        );
        if let Err(e) = source.connect().await {
            destination.disconnect().await;
            return Err(e);
        }

        Ok(Self::from_parts(
            client_id,
            source,
            destination,
            settings.source.host.clone(),
            settings.bridge.drain_grace(),
        ))
    }
}

impl<D: Destination> Bridge<D> {
    /// Assembles a bridge from connections that are already open.
    pub(crate) fn from_parts(
        client_id: String,
        source: SourceConnection,
        destination: Arc<D>,
        broker_id: String,
        drain_grace: Duration,
    ) -> Self {
        let dispatcher = Dispatcher::new(destination.clone(), broker_id);
        let (state, _) = watch::channel(LifecycleState::Starting);
        Self {
            state,
            client_id,
            source,
            destination,
            dispatcher,
            drain_grace,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Follows the lifecycle transitions.
    pub fn lifecycle(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Relays until `shutdown` fires, then drains: stop the source loop,
    /// disconnect the source, wait the grace period for in-flight publishes
    /// and disconnect the destination.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> LifecycleState {
        self.transition(LifecycleState::Running);
        self.source.run(&self.dispatcher, &mut shutdown).await;

        self.transition(LifecycleState::Draining);
        self.source.stop(&self.dispatcher).await;

        info!(
            "waiting {:?} for in-flight publishes to complete",
            self.drain_grace
        );
        tokio::time::sleep(self.drain_grace).await;

        self.destination.disconnect().await;

        self.transition(LifecycleState::Stopped);
        self.state()
    }

    fn transition(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        info!("bridge {} -> {}", previous, next);
    }
}
