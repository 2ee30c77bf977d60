// Controller wire models
//
// Records decoded from the controller's REST responses. Panel and device
// layouts are owned by the UI layer; we only model the fields the session
// engine needs (names, sensor references, command names) and keep the rest
// in `extra`. Fields use `#[serde(default)]` liberally because controller
// builds disagree about which fields are present.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

// ── Response codes ───────────────────────────────────────────────────

/// Outcome classification handed to session callbacks.
///
/// Mixes client-side kinds (`InvalidUrl`, `AlreadyRegistered`, ...) with
/// codes the controller sends in structured error bodies, which pass through
/// as [`ResponseCode::Controller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResponseCode {
    Ok,
    NoContent,
    InvalidUrl,
    AlreadyRegistered,
    NullTarget,
    Disconnected,
    /// De-registration notice. Not an operational failure.
    Unregistered,
    Timeout,
    NoResponse,
    UnknownError,
    Controller(u16),
}

impl ResponseCode {
    /// Map a code from a controller error body.
    pub fn from_controller(code: u16) -> Self {
        match code {
            200 => Self::Ok,
            204 => Self::NoContent,
            504 => Self::Timeout,
            other => Self::Controller(other),
        }
    }

    /// `true` for the success codes (`Ok`, `NoContent`).
    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::NoContent)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::NoContent => f.write_str("no content"),
            Self::InvalidUrl => f.write_str("invalid URL"),
            Self::AlreadyRegistered => f.write_str("already registered"),
            Self::NullTarget => f.write_str("null target"),
            Self::Disconnected => f.write_str("disconnected"),
            Self::Unregistered => f.write_str("unregistered"),
            Self::Timeout => f.write_str("timeout"),
            Self::NoResponse => f.write_str("no response"),
            Self::UnknownError => f.write_str("unknown error"),
            Self::Controller(code) => write!(f, "controller error {code}"),
        }
    }
}

/// Structured error body: `{"error": {"code": 504, "message": "..."}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ControllerErrorBody {
    pub error: ControllerErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ControllerErrorDetail {
    #[serde(deserialize_with = "number_or_string")]
    pub code: u16,
    #[serde(default)]
    pub message: Option<String>,
}

// ── Sensors ──────────────────────────────────────────────────────────

/// Opaque identifier of one server-side sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SensorId(pub i32);

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i32> for SensorId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl<'de> Deserialize<'de> for SensorId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        number_or_string(deserializer).map(SensorId)
    }
}

/// Sensors whose value changed since the last poll.
pub type SensorDelta = HashMap<SensorId, String>;

/// Comma-joined id list as embedded in status and polling paths.
pub fn join_sensor_ids(ids: &[SensorId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// One `{ "id": 1001, "value": "on" }` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorStatus {
    pub id: SensorId,
    #[serde(default)]
    pub value: String,
}

/// Envelope for snapshot and poll responses.
#[derive(Debug, Default, Deserialize)]
pub struct SensorStatusList {
    #[serde(default, deserialize_with = "one_or_many")]
    pub status: Vec<SensorStatus>,
}

impl SensorStatusList {
    pub fn into_delta(self) -> SensorDelta {
        self.status.into_iter().map(|s| (s.id, s.value)).collect()
    }
}

// ── Panels ───────────────────────────────────────────────────────────

/// Entry from `rest/panels/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelInfo {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    pub name: String,
}

/// `{ "panel": [...] }` envelope. Single-panel controllers send an object
/// instead of an array.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct PanelInfoList {
    #[serde(default, deserialize_with = "one_or_many")]
    pub panel: Vec<PanelInfo>,
}

/// A panel layout, reduced to what sensor monitoring needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Panel {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub widgets: Vec<Widget>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One widget on a panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub sensor_links: Vec<SensorLinkRef>,
    /// Control command sender ids bound to this widget, if any.
    #[serde(default)]
    pub command_ids: Vec<i32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `{ "ref": 1001 }` reference from a widget to a sensor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SensorLinkRef {
    #[serde(rename = "ref")]
    pub sensor: SensorId,
}

// ── Devices ──────────────────────────────────────────────────────────

/// Entry from `rest/devices/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    pub name: String,
}

/// Full device record from `rest/devices/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub commands: Vec<DeviceCommand>,
    #[serde(default)]
    pub sensors: Vec<DeviceSensor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCommand {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSensor {
    pub id: SensorId,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

// ── Commands ─────────────────────────────────────────────────────────

/// A control command addressed to a widget's sender id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCommand {
    pub sender_id: i32,
    pub data: String,
}

/// Result of a control command: the sender id echoed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCommandResponse {
    pub sender_id: i32,
    pub code: ResponseCode,
}

/// A named device command (`rest/devices/{device}/commands?name=...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedCommand {
    pub device: String,
    pub name: String,
}

/// Result of a named command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub code: ResponseCode,
}

// ── Resources ────────────────────────────────────────────────────────

/// Metadata from a `HEAD` on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceDetails {
    pub name: String,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Raw resource bytes tagged with the requested name.
#[derive(Debug, Clone)]
pub struct ResourceData {
    pub name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

// ── Controller identity ──────────────────────────────────────────────

/// Identity of a controller, as announced by discovery or configured.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControllerInfo {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub identity: Option<String>,
}

impl ControllerInfo {
    /// Identity for controllers that only announce their URL.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
            version: None,
            identity: None,
        }
    }
}

// ── Serde helpers ────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    Text(String),
}

/// Accept `1001` and `"1001"`: controllers serialize ids both ways.
fn number_or_string<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64>,
{
    let raw = match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n,
        NumberOrString::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| de::Error::custom(format!("expected numeric id, got {s:?}")))?,
    };
    T::try_from(raw).map_err(|_| de::Error::custom(format!("id {raw} out of range")))
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<NumberOrString>::deserialize(deserializer)?.map(|v| match v {
            NumberOrString::Number(n) => n.to_string(),
            NumberOrString::Text(s) => s,
        }),
    )
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(
        match Option::<OneOrMany<T>>::deserialize(deserializer)? {
            Some(OneOrMany::Many(items)) => items,
            Some(OneOrMany::One(item)) => vec![item],
            None => Vec::new(),
        },
    )
}
