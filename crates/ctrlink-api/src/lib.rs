// ctrlink-api: Async client for automation controllers (REST commands,
// long-poll sensors, LAN discovery)

pub mod client;
mod commands;
mod devices;
pub mod discovery;
pub mod error;
pub mod models;
mod panels;
mod resources;
mod sensors;
mod session;
pub mod transport;

pub use client::{ControllerClient, DEFAULT_POLL_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, RestCommand};
pub use discovery::{DedupKey, DiscoveryConfig, DiscoveryEvent, DiscoveryService};
pub use error::Error;
pub use models::{ControllerInfo, ResponseCode, SensorDelta, SensorId};
pub use sensors::decode_poll;
pub use transport::{
    Credentials, HttpTransport, TlsMode, Transport, TransportConfig, TransportRequest,
    TransportResponse,
};
