// ── Connector ──
//
// Session state over a connectionless transport. "Connected" means the last
// probe of the controller answered; the connector owns the client built for
// that connection plus the identity and credentials it was built from.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use ctrlink_api::transport::{Credentials, Transport};
use ctrlink_api::{ControllerClient, ControllerInfo};

use crate::config::ControllerConfig;
use crate::error::CoreError;

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// What a `connect` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// This call established the connection.
    Connected,
    /// Nothing to do.
    AlreadyConnected,
    /// Another connect is in flight; this call did nothing.
    InProgress,
}

pub struct Connector {
    transport: Arc<dyn Transport>,
    config: ControllerConfig,
    info: ArcSwap<ControllerInfo>,
    credentials: ArcSwapOption<Credentials>,
    client: ArcSwapOption<ControllerClient>,
    state: watch::Sender<ConnectionState>,
    /// Bumped by every disconnect so a connect that was in flight when the
    /// session was torn down does not resurrect it.
    epoch: AtomicU64,
}

impl Connector {
    pub fn new(config: ControllerConfig, transport: Arc<dyn Transport>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            info: ArcSwap::from_pointee(config.info()),
            credentials: ArcSwapOption::from(config.credentials.clone().map(Arc::new)),
            client: ArcSwapOption::empty(),
            state,
            epoch: AtomicU64::new(0),
            config,
        }
    }

    // ── State ────────────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn info(&self) -> ControllerInfo {
        self.info.load().as_ref().clone()
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.load().is_some()
    }

    /// Replace the controller identity. Only allowed while disconnected.
    pub fn set_info(&self, info: ControllerInfo) -> Result<(), CoreError> {
        if self.state() != ConnectionState::Disconnected {
            return Err(CoreError::Unknown {
                message: "controller identity cannot change while connected".into(),
            });
        }
        debug!(url = %info.url, "controller identity updated");
        self.info.store(Arc::new(info));
        Ok(())
    }

    /// Takes effect on the next connect.
    pub fn set_credentials(&self, credentials: Option<Credentials>) {
        self.credentials.store(credentials.map(Arc::new));
    }

    /// The client for the live connection.
    pub fn client(&self) -> Result<Arc<ControllerClient>, CoreError> {
        if !self.is_connected() {
            return Err(CoreError::Disconnected);
        }
        self.client.load_full().ok_or(CoreError::Disconnected)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Probe the controller and, on a 200, mark the session connected.
    ///
    /// A no-op while connected or while another connect is in flight.
    /// `timeout` overrides the configured request timeout for the probe.
    /// Dropping the returned future before it resolves puts the session
    /// back to `Disconnected`.
    pub async fn connect(&self, timeout: Option<Duration>) -> Result<ConnectOutcome, CoreError> {
        let mut previous = ConnectionState::Disconnected;
        let claimed = self.state.send_if_modified(|state| {
            previous = *state;
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Ok(match previous {
                ConnectionState::Connected => ConnectOutcome::AlreadyConnected,
                _ => ConnectOutcome::InProgress,
            });
        }

        let claim = ConnectClaim {
            connector: self,
            epoch: self.epoch.load(Ordering::SeqCst),
            armed: true,
        };
        let info = self.info();
        debug!(url = %info.url, "connecting");

        let result = match self.build_client(&info.url) {
            Ok(client) => client
                .connect(timeout.unwrap_or(self.config.timeout))
                .await
                .map(|()| client)
                .map_err(CoreError::from_probe),
            Err(e) => Err(e),
        };

        match result {
            Ok(client) => {
                self.client.store(Some(Arc::new(client)));
                let committed = self.state.send_if_modified(|state| {
                    if claim.is_current() && *state == ConnectionState::Connecting {
                        *state = ConnectionState::Connected;
                        true
                    } else {
                        false
                    }
                });
                claim.disarm();
                if !committed {
                    debug!("disconnected while connecting, dropping connection");
                    return Err(CoreError::Disconnected);
                }
                info!(url = %info.url, "connected to controller");
                Ok(ConnectOutcome::Connected)
            }
            Err(e) => {
                drop(claim);
                warn!(url = %info.url, error = %e, "connect failed");
                Err(e)
            }
        }
    }

    /// Re-probe the live connection.
    pub async fn probe(&self) -> Result<(), CoreError> {
        let client = self.client()?;
        client
            .connect(self.config.timeout)
            .await
            .map_err(CoreError::from_probe)
    }

    /// Drop the connection. Returns `false` if there was nothing to drop.
    ///
    /// The only transport-level teardown is releasing the client; there is
    /// no socket to close.
    pub fn disconnect(&self) -> bool {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let previous = self.state.send_replace(ConnectionState::Disconnected);
        self.client.store(None);
        if previous == ConnectionState::Disconnected {
            return false;
        }
        info!(url = %self.info.load().url, "disconnected from controller");
        true
    }

    /// Log out and forget the credentials, whatever the outcome.
    ///
    /// Works while disconnected too, as long as the URL is usable.
    pub async fn logout(&self, timeout: Option<Duration>) -> Result<(), CoreError> {
        let mut client = match self.client.load_full() {
            Some(client) => client,
            None => Arc::new(self.build_client(&self.info.load().url)?),
        };
        if let Some(timeout) = timeout {
            client = Arc::new((*client).clone().with_request_timeout(timeout));
        }
        let result = client.logout().await.map_err(CoreError::from);
        self.credentials.store(None);
        if let Some(live) = self.client.load_full() {
            self.client
                .store(Some(Arc::new((*live).clone().with_credentials(None))));
        }
        result
    }

    fn build_client(&self, url: &str) -> Result<ControllerClient, CoreError> {
        let credentials = self.credentials.load_full().map(|c| (*c).clone());
        Ok(ControllerClient::new(url, Arc::clone(&self.transport))?
            .with_credentials(credentials)
            .with_timeouts(self.config.timeout, self.config.poll_timeout))
    }
}

/// The `Connecting` state claimed by one `connect` call.
///
/// Dropping it hands the state back to `Disconnected`, unless a disconnect
/// has happened since the claim was taken.
struct ConnectClaim<'a> {
    connector: &'a Connector,
    epoch: u64,
    armed: bool,
}

impl ConnectClaim<'_> {
    fn is_current(&self) -> bool {
        self.connector.epoch.load(Ordering::SeqCst) == self.epoch
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectClaim<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let current = self.is_current();
        let released = self.connector.state.send_if_modified(|state| {
            if current && *state == ConnectionState::Connecting {
                *state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        });
        if released {
            debug!("connect abandoned, back to disconnected");
        }
    }
}
