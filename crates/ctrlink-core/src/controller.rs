// ── Controller abstraction ──
//
// Session manager for one controller: owns the connector, the registration
// map and the stored connect callback. Connecting replays every registered
// handle; a heartbeat task re-probes the controller and, when the probe
// fails, re-connects with backoff until it succeeds or the caller
// disconnects.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ctrlink_api::discovery::{DiscoveryConfig, DiscoveryEvent, DiscoveryService};
use ctrlink_api::models::{
    CommandResponse, ControlCommand, ControlCommandResponse, Device, DeviceInfo, NamedCommand,
    Panel, PanelInfo, ResourceData, ResourceDetails,
};
use ctrlink_api::transport::{Credentials, HttpTransport, Transport};
use ctrlink_api::{ControllerClient, ControllerInfo, ResponseCode, SensorDelta, SensorId};

use crate::config::ControllerConfig;
use crate::connector::{ConnectOutcome, ConnectionState, Connector};
use crate::error::CoreError;
use crate::registration::{RegistrationHandle, SubscriberKey, Target};
use crate::subscriber::{
    ConnectCallback, DeviceSubscriber, PanelSubscriber, RegistrationCallback,
};

// ── Controller ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. A clone made with
/// [`Controller::with_timeout`] shares the session but uses its own
/// deadline for the calls made through it.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
    timeout: Option<Duration>,
}

struct ControllerInner {
    config: ControllerConfig,
    connector: Arc<Connector>,
    handles: DashMap<SubscriberKey, RegistrationHandle>,
    connect_callback: Mutex<Option<Arc<dyn ConnectCallback>>>,
    supervisor: Mutex<Option<Supervisor>>,
    discovery: DiscoveryService,
}

struct Supervisor {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl Controller {
    /// Create a session using the HTTP transport. Does NOT connect.
    pub fn new(config: ControllerConfig) -> Result<Self, CoreError> {
        let transport = HttpTransport::new(&config.transport_config())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a session over the given transport.
    pub fn with_transport(config: ControllerConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_services(config, transport, DiscoveryService::new())
    }

    /// Create a session sharing an existing discovery service.
    pub fn with_services(
        config: ControllerConfig,
        transport: Arc<dyn Transport>,
        discovery: DiscoveryService,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                connector: Arc::new(Connector::new(config.clone(), transport)),
                config,
                handles: DashMap::new(),
                connect_callback: Mutex::new(None),
                supervisor: Mutex::new(None),
                discovery,
            }),
            timeout: None,
        }
    }

    /// A handle on the same session whose requests (connect probe, lookups,
    /// commands, resources, logout) use `timeout` instead of the configured
    /// request timeout. Long-polls keep the poll timeout.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            timeout: Some(timeout),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn info(&self) -> ControllerInfo {
        self.inner.connector.info()
    }

    pub fn connector(&self) -> &Arc<Connector> {
        &self.inner.connector
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Connect to the controller.
    ///
    /// A no-op if already connected or connecting. On success the callback
    /// (if any) is kept for later drop and re-connect notices, every
    /// registered handle resumes monitoring, and the heartbeat starts.
    pub async fn connect(
        &self,
        callback: Option<Arc<dyn ConnectCallback>>,
    ) -> Result<ConnectOutcome, CoreError> {
        let outcome = match self.establish(self.timeout).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Some(cb) = &callback {
                    cb.on_failure(e.response_code());
                }
                return Err(e);
            }
        };
        if outcome != ConnectOutcome::Connected {
            debug!(?outcome, "connect ignored");
            return Ok(outcome);
        }

        if let Some(cb) = callback {
            *self.inner.connect_callback.lock().await = Some(Arc::clone(&cb));
            cb.on_success();
        }
        self.start_supervisor().await;
        Ok(outcome)
    }

    /// Disconnect from the controller.
    ///
    /// A no-op if already disconnected. Otherwise stops the heartbeat,
    /// deactivates every handle (they stay registered), drops the
    /// connection and tells the stored connect callback `Disconnected`.
    pub async fn disconnect(&self) {
        let reconnecting = self.stop_supervisor().await;
        if self.inner.connector.state() == ConnectionState::Disconnected && !reconnecting {
            return;
        }
        self.drop_connection(ResponseCode::Disconnected).await;
    }

    /// Point the session at a different controller.
    ///
    /// A live connection is dropped first; if it had been established with
    /// a callback, the session re-connects to the new URL with it.
    pub async fn set_url(&self, url: impl Into<String>) -> Result<(), CoreError> {
        let was_connected = self.inner.connector.state() != ConnectionState::Disconnected;
        if was_connected {
            self.disconnect().await;
        }

        let mut info = self.inner.connector.info();
        info.url = url.into();
        self.inner.connector.set_info(info)?;

        let stored = self.inner.connect_callback.lock().await.clone();
        if let (true, Some(cb)) = (was_connected, stored) {
            info!("re-connecting to new controller URL");
            self.connect(Some(cb)).await?;
        }
        Ok(())
    }

    /// Replace the whole controller identity (e.g. from discovery).
    /// Only allowed while disconnected.
    pub fn set_info(&self, info: ControllerInfo) -> Result<(), CoreError> {
        self.inner.connector.set_info(info)
    }

    /// Takes effect on the next connect.
    pub fn set_credentials(&self, credentials: Option<Credentials>) {
        self.inner.connector.set_credentials(credentials);
    }

    /// Log out and forget the credentials.
    pub async fn logout(&self) -> Result<(), CoreError> {
        self.inner.connector.logout(self.timeout).await
    }

    // ── State observation ────────────────────────────────────────

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connector.subscribe_state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connector.is_connected()
    }

    // ── Registrations ────────────────────────────────────────────

    /// Subscribe a panel to its widgets' sensors.
    ///
    /// Re-registering a panel returns the existing handle and reports
    /// `AlreadyRegistered` to the new callback. While disconnected the
    /// handle is stored and starts on the next connect.
    pub async fn register_panel(
        &self,
        panel: Arc<dyn PanelSubscriber>,
        callback: Arc<dyn RegistrationCallback>,
    ) -> Result<RegistrationHandle, CoreError> {
        if panel.panel_name().is_empty() {
            callback.on_failure(ResponseCode::NullTarget);
            return Err(CoreError::NullTarget);
        }
        self.register(Target::Panel(panel), callback).await
    }

    /// Subscribe a device to its sensors.
    pub async fn register_device(
        &self,
        device: Arc<dyn DeviceSubscriber>,
        callback: Arc<dyn RegistrationCallback>,
    ) -> Result<RegistrationHandle, CoreError> {
        if device.device_name().is_empty() {
            callback.on_failure(ResponseCode::NullTarget);
            return Err(CoreError::NullTarget);
        }
        self.register(Target::Device(device), callback).await
    }

    async fn register(
        &self,
        target: Target,
        callback: Arc<dyn RegistrationCallback>,
    ) -> Result<RegistrationHandle, CoreError> {
        let key = target.key();
        let handle = match self.inner.handles.entry(key.clone()) {
            Entry::Occupied(existing) => {
                let handle = existing.get().clone();
                drop(existing);
                debug!(%key, "already registered");
                callback.on_failure(ResponseCode::AlreadyRegistered);
                return Ok(handle);
            }
            Entry::Vacant(slot) => {
                let handle = RegistrationHandle::new(target, callback);
                slot.insert(handle.clone());
                handle
            }
        };

        info!(%key, token = %handle.token(), "registered");
        if self.inner.connector.is_connected() {
            handle.activate(&self.inner.connector).await;
        }
        Ok(handle)
    }

    pub async fn unregister_panel(&self, name: &str) -> Result<(), CoreError> {
        self.unregister(&SubscriberKey::Panel(name.to_owned())).await
    }

    pub async fn unregister_device(&self, name: &str) -> Result<(), CoreError> {
        self.unregister(&SubscriberKey::Device(name.to_owned())).await
    }

    /// End a registration. The handle's callback receives `Unregistered`.
    pub async fn unregister(&self, key: &SubscriberKey) -> Result<(), CoreError> {
        if let SubscriberKey::Panel(name) | SubscriberKey::Device(name) = key {
            if name.is_empty() {
                return Err(CoreError::NullTarget);
            }
        }
        let (_, handle) = self
            .inner
            .handles
            .remove(key)
            .ok_or(CoreError::Unregistered)?;
        handle.unregister().await;
        Ok(())
    }

    pub fn registration(&self, key: &SubscriberKey) -> Option<RegistrationHandle> {
        self.inner.handles.get(key).map(|h| h.value().clone())
    }

    pub fn registrations(&self) -> Vec<RegistrationHandle> {
        self.inner
            .handles
            .iter()
            .map(|h| h.value().clone())
            .collect()
    }

    // ── Requests ─────────────────────────────────────────────────

    pub async fn list_panels(&self) -> Result<Vec<PanelInfo>, CoreError> {
        Ok(self.client()?.list_panels().await?)
    }

    pub async fn get_panel(&self, name: &str) -> Result<Panel, CoreError> {
        if name.is_empty() {
            return Err(CoreError::NullTarget);
        }
        Ok(self.client()?.get_panel(name).await?)
    }

    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>, CoreError> {
        Ok(self.client()?.list_devices().await?)
    }

    pub async fn get_device(&self, name: &str) -> Result<Device, CoreError> {
        if name.is_empty() {
            return Err(CoreError::NullTarget);
        }
        Ok(self.client()?.get_device(name).await?)
    }

    pub async fn sensor_values(&self, ids: &[SensorId]) -> Result<SensorDelta, CoreError> {
        Ok(self.client()?.sensor_values(ids).await?)
    }

    pub async fn send_control_command(
        &self,
        command: &ControlCommand,
    ) -> Result<ControlCommandResponse, CoreError> {
        Ok(self.client()?.send_control_command(command).await?)
    }

    pub async fn send_named_command(
        &self,
        command: &NamedCommand,
        parameter: Option<&str>,
    ) -> Result<CommandResponse, CoreError> {
        Ok(self.client()?.send_named_command(command, parameter).await?)
    }

    pub async fn resource_details(&self, name: &str) -> Result<ResourceDetails, CoreError> {
        Ok(self.client()?.resource_details(name).await?)
    }

    pub async fn resource_data(&self, name: &str) -> Result<ResourceData, CoreError> {
        Ok(self.client()?.resource_data(name).await?)
    }

    /// The live client, with this handle's deadline applied.
    fn client(&self) -> Result<Arc<ControllerClient>, CoreError> {
        let client = self.inner.connector.client()?;
        Ok(match self.timeout {
            Some(timeout) => Arc::new((*client).clone().with_request_timeout(timeout)),
            None => client,
        })
    }

    // ── Discovery ────────────────────────────────────────────────

    /// Start looking for controllers. `None` if a search is already running.
    pub async fn start_discovery(
        &self,
        config: DiscoveryConfig,
    ) -> Option<mpsc::UnboundedReceiver<DiscoveryEvent>> {
        self.inner.discovery.start(config).await
    }

    pub async fn stop_discovery(&self) {
        self.inner.discovery.stop().await;
    }

    // ── Internals ────────────────────────────────────────────────

    /// Connect the connector and, if this call connected it, replay
    /// every registration.
    async fn establish(&self, timeout: Option<Duration>) -> Result<ConnectOutcome, CoreError> {
        let outcome = self.inner.connector.connect(timeout).await?;
        if outcome == ConnectOutcome::Connected {
            let handles = self.registrations();
            debug!(count = handles.len(), "resuming registrations");
            for handle in handles {
                handle.activate(&self.inner.connector).await;
            }
        }
        Ok(outcome)
    }

    /// Deactivate handles, drop the connection and notify the stored
    /// callback with `code`.
    async fn drop_connection(&self, code: ResponseCode) {
        for handle in self.registrations() {
            handle.deactivate().await;
        }
        self.inner.connector.disconnect();
        let stored = self.inner.connect_callback.lock().await.clone();
        if let Some(cb) = stored {
            cb.on_failure(code);
        }
    }

    async fn start_supervisor(&self) {
        let Some(interval) = self.inner.config.heartbeat_interval else {
            return;
        };
        let mut slot = self.inner.supervisor.lock().await;
        if let Some(old) = slot.take() {
            old.cancel.cancel();
        }
        let cancel = CancellationToken::new();
        let join = tokio::spawn(supervise(
            Arc::downgrade(&self.inner),
            interval,
            cancel.clone(),
        ));
        *slot = Some(Supervisor { cancel, join });
    }

    /// Returns `true` if the supervisor was mid re-connect.
    async fn stop_supervisor(&self) -> bool {
        let Some(old) = self.inner.supervisor.lock().await.take() else {
            return false;
        };
        old.cancel.cancel();
        let reconnecting = self.inner.connector.state() != ConnectionState::Connected;
        let _ = old.join.await;
        reconnecting
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Heartbeat while connected; re-connect with backoff after a drop.
async fn supervise(
    inner: Weak<ControllerInner>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(interval) => {}
        }
        let Some(ctrl) = upgrade(&inner) else { return };
        let probe = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = ctrl.inner.connector.probe() => result,
        };
        let Err(e) = probe else { continue };

        warn!(error = %e, "heartbeat failed, connection lost");
        ctrl.drop_connection(ResponseCode::NoResponse).await;
        let reconnect = ctrl.inner.config.reconnect.clone();
        drop(ctrl);

        let mut attempt: u32 = 0;
        loop {
            let delay = reconnect.backoff(attempt);
            debug!(attempt, delay_ms = delay.as_millis(), "re-connect scheduled");
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            let Some(ctrl) = upgrade(&inner) else { return };
            let established = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                result = ctrl.establish(None) => result,
            };
            match established {
                Ok(ConnectOutcome::Connected) => {
                    info!(attempt, "re-connected to controller");
                    let stored = ctrl.inner.connect_callback.lock().await.clone();
                    if let Some(cb) = stored {
                        cb.on_success();
                    }
                    break;
                }
                Ok(ConnectOutcome::AlreadyConnected) => break,
                Ok(ConnectOutcome::InProgress) => {}
                Err(e) => debug!(attempt, error = %e, "re-connect failed"),
            }
            attempt = attempt.saturating_add(1);
        }
    }
}

fn upgrade(inner: &Weak<ControllerInner>) -> Option<Controller> {
    inner
        .upgrade()
        .map(|inner| Controller { inner, timeout: None })
}
