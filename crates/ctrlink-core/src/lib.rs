// ctrlink-core: Session and subscription engine between ctrlink-api and
// consumers (CLI, embedding UIs).

pub mod config;
pub mod connector;
pub mod controller;
pub mod error;
pub mod registration;
pub mod subscriber;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ControllerConfig, ReconnectConfig, TlsVerification};
pub use connector::{ConnectOutcome, ConnectionState, Connector};
pub use controller::Controller;
pub use error::CoreError;
pub use registration::{RegistrationHandle, SubscriberKey};
pub use subscriber::{
    ConnectCallback, ControllerLink, DeviceSubscriber, PanelSubscriber, RegistrationCallback,
    SensoryWidget,
};

// Wire types consumers need without depending on ctrlink-api directly.
pub use ctrlink_api::models::{
    CommandResponse, ControlCommand, ControlCommandResponse, Device, DeviceInfo, NamedCommand,
    Panel, PanelInfo, ResourceData, ResourceDetails, Widget,
};
pub use ctrlink_api::transport::Credentials;
pub use ctrlink_api::{
    ControllerInfo, DedupKey, DiscoveryConfig, DiscoveryEvent, DiscoveryService, ResponseCode,
    SensorDelta, SensorId,
};
