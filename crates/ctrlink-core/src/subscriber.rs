// ── Subscriber contracts ──
//
// What the session engine needs from the UI layer, and what it hands back.
// Panels and devices are owned elsewhere; the engine only sees them through
// these traits. Sensor values flow in through `SensoryWidget::set_sensor_value`
// and `DeviceSubscriber::set_sensor_value`. Commands and resources flow out
// through the `ControllerLink` attached while a registration is active.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ctrlink_api::models::{
    CommandResponse, ControlCommand, ControlCommandResponse, NamedCommand, ResourceData,
    ResourceDetails,
};
use ctrlink_api::{ControllerClient, ResponseCode, SensorId};

use crate::connector::Connector;
use crate::error::CoreError;

// ── Sensor subscribers ───────────────────────────────────────────────

/// A widget that displays one or more sensor values.
pub trait SensoryWidget: Send + Sync {
    /// The sensors this widget links to. May repeat an id.
    fn sensor_links(&self) -> Vec<SensorId>;

    /// Push a new value for one of the linked sensors.
    fn set_sensor_value(&self, sensor: SensorId, value: &str);
}

/// A panel: a named collection of widgets.
pub trait PanelSubscriber: Send + Sync {
    fn panel_name(&self) -> String;

    fn sensory_widgets(&self) -> Vec<Arc<dyn SensoryWidget>>;

    /// Attach or detach the command/resource link.
    fn set_controller_link(&self, _link: Option<ControllerLink>) {}
}

/// A physical device exposing sensors.
pub trait DeviceSubscriber: Send + Sync {
    fn device_name(&self) -> String;

    fn sensor_ids(&self) -> Vec<SensorId>;

    fn set_sensor_value(&self, sensor: SensorId, value: &str);

    fn set_controller_link(&self, _link: Option<ControllerLink>) {}
}

// ── Callbacks ────────────────────────────────────────────────────────

/// Outcome channel for one registration.
///
/// `on_failure` also carries the [`ResponseCode::Unregistered`] notice sent
/// when a registration ends normally; implementations must switch on the
/// code rather than treat every call as a fault.
pub trait RegistrationCallback: Send + Sync {
    fn on_success(&self);
    fn on_failure(&self, code: ResponseCode);
}

/// Outcome channel for the session connection.
///
/// After a successful connect the session keeps this callback and reports
/// later drops ([`ResponseCode::Disconnected`], [`ResponseCode::NoResponse`])
/// and automatic re-connects to it.
pub trait ConnectCallback: Send + Sync {
    fn on_success(&self);
    fn on_failure(&self, code: ResponseCode);
}

// ── Controller link ──────────────────────────────────────────────────

/// Command and resource access handed to a registered subscriber.
///
/// Calls fail with [`CoreError::Unregistered`] once the registration is
/// gone and with [`CoreError::Disconnected`] while the session is down.
#[derive(Clone)]
pub struct ControllerLink {
    connector: Arc<Connector>,
    registered: Arc<AtomicBool>,
}

impl std::fmt::Debug for ControllerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerLink")
            .field("registered", &self.registered.load(Ordering::Acquire))
            .field("state", &self.connector.state())
            .finish()
    }
}

impl ControllerLink {
    pub(crate) fn new(connector: Arc<Connector>, registered: Arc<AtomicBool>) -> Self {
        Self {
            connector,
            registered,
        }
    }

    fn client(&self) -> Result<Arc<ControllerClient>, CoreError> {
        if !self.registered.load(Ordering::Acquire) {
            return Err(CoreError::Unregistered);
        }
        self.connector.client()
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
}
