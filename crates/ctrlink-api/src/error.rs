use thiserror::Error;

use crate::models::ResponseCode;

/// Top-level error type for the `ctrlink-api` crate.
///
/// Covers every failure mode of the request/response surface and the
/// discovery sockets. `ctrlink-core` folds these into response codes
/// before handing them to subscriber callbacks.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// No controller URL configured, or the URL cannot carry REST paths.
    #[error("Controller URL is missing or cannot be used as a base: {0:?}")]
    UnusableUrl(String),

    /// Request timed out client-side.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Controller ──────────────────────────────────────────────────
    /// Structured error body returned by the controller
    /// (`{"error": {"code": N, "message": "..."}}`).
    #[error("Controller error {code}: {message}")]
    Controller { code: u16, message: String },

    /// Non-success status without a decodable error body.
    #[error("Unexpected HTTP status {status}")]
    UnexpectedStatus { status: u16 },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Discovery ───────────────────────────────────────────────────
    /// The discovery collector socket could not be bound.
    #[error("Discovery collector could not bind TCP port {port}: {source}")]
    DiscoveryBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Returns `true` when the failure means "the controller held the
    /// request until its own deadline", either as a client-side timeout or
    /// as a structured 504 error from the controller.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Controller { code, .. } => *code == 504,
            Self::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Returns `true` if the controller could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_connect() || e.is_timeout(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Classify this error into the response-code taxonomy.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            Self::InvalidUrl(_) | Self::UnusableUrl(_) => ResponseCode::InvalidUrl,
            Self::Timeout { .. } => ResponseCode::Timeout,
            Self::Transport(e) if e.is_timeout() => ResponseCode::Timeout,
            Self::Transport(e) if e.is_connect() => ResponseCode::NoResponse,
            Self::Controller { code, .. } => ResponseCode::from_controller(*code),
            Self::Transport(_)
            | Self::Tls(_)
            | Self::UnexpectedStatus { .. }
            | Self::Deserialization { .. }
            | Self::DiscoveryBind { .. } => ResponseCode::UnknownError,
        }
    }
}
