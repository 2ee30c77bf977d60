// ── Runtime connection configuration ──
//
// These types describe *how* to talk to a controller: where it is, who we
// are, and the timing knobs of the session. They never touch disk; the CLI
// builds a `ControllerConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use ctrlink_api::transport::{Credentials, TlsMode, TransportConfig};
use ctrlink_api::{ControllerInfo, DEFAULT_POLL_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed certs).
    DangerAcceptInvalid,
}

/// Exponential backoff for automatic re-connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first attempt. Default: 1s.
    pub initial_delay: Duration,
    /// Upper bound on the delay. Default: 30s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectConfig {
    /// `min(initial * 2^attempt, max)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

/// Configuration for one controller session.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Controller base URL. Validated at connect time, not here.
    pub url: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub identity: Option<String>,
    /// Basic-auth credentials, if the controller wants them.
    pub credentials: Option<Credentials>,
    pub tls: TlsVerification,
    /// Deadline for ordinary requests.
    pub timeout: Duration,
    /// Deadline for the long-poll call.
    pub poll_timeout: Duration,
    /// How often to re-probe the controller while connected. `None` disables
    /// the heartbeat and with it automatic re-connects.
    pub heartbeat_interval: Option<Duration>,
    pub reconnect: ReconnectConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            name: None,
            version: None,
            identity: None,
            credentials: None,
            tls: TlsVerification::default(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            heartbeat_interval: Some(Duration::from_secs(30)),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Seed a config from a discovery announcement.
    pub fn from_info(info: ControllerInfo) -> Self {
        Self {
            url: info.url,
            name: info.name,
            version: info.version,
            identity: info.identity,
            ..Self::default()
        }
    }

    /// The identity part of this config.
    pub fn info(&self) -> ControllerInfo {
        ControllerInfo {
            url: self.url.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            identity: self.identity.clone(),
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            connect_timeout: self.timeout,
        }
    }
}
