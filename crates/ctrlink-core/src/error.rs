// ── Core error types ──
//
// Session-facing errors. Callers see the response-code taxonomy, never raw
// HTTP statuses or JSON failures: `From<ctrlink_api::Error>` folds
// transport-layer failures into these variants.

use thiserror::Error;

use ctrlink_api::ResponseCode;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Invalid controller URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No response from controller: {reason}")]
    NoResponse { reason: String },

    #[error("Controller disconnected")]
    Disconnected,

    #[error("Controller request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Registration errors ──────────────────────────────────────────
    #[error("Subscriber {subscriber} is already registered")]
    AlreadyRegistered { subscriber: String },

    #[error("No panel or device given")]
    NullTarget,

    #[error("Subscriber is no longer registered")]
    Unregistered,

    // ── Controller errors ────────────────────────────────────────────
    /// Structured error code from the controller, passed through.
    #[error("Controller error {code}: {message}")]
    Controller { code: u16, message: String },

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

impl CoreError {
    /// Classify into the response-code taxonomy handed to callbacks.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            Self::InvalidUrl { .. } => ResponseCode::InvalidUrl,
            Self::NoResponse { .. } => ResponseCode::NoResponse,
            Self::Disconnected => ResponseCode::Disconnected,
            Self::Timeout { .. } => ResponseCode::Timeout,
            Self::AlreadyRegistered { .. } => ResponseCode::AlreadyRegistered,
            Self::NullTarget => ResponseCode::NullTarget,
            Self::Unregistered => ResponseCode::Unregistered,
            Self::Controller { code, .. } => ResponseCode::from_controller(*code),
            Self::Unknown { .. } => ResponseCode::UnknownError,
        }
    }

    /// Fold an error from the connect or heartbeat probe. Timeouts there
    /// mean the controller is not answering.
    pub(crate) fn from_probe(err: ctrlink_api::Error) -> Self {
        if err.is_timeout() {
            return Self::NoResponse {
                reason: err.to_string(),
            };
        }
        Self::from(err)
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ctrlink_api::Error> for CoreError {
    fn from(err: ctrlink_api::Error) -> Self {
        use ctrlink_api::Error as Api;

        match err {
            Api::InvalidUrl(e) => CoreError::InvalidUrl {
                url: String::new(),
                reason: e.to_string(),
            },
            Api::UnusableUrl(url) => CoreError::InvalidUrl {
                url,
                reason: "not an http(s) base URL".into(),
            },
            Api::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            Api::Controller { code: 504, .. } => CoreError::Timeout { timeout_secs: 0 },
            Api::Controller { code, message } => CoreError::Controller { code, message },
            Api::Transport(ref e) if e.is_timeout() => CoreError::Timeout { timeout_secs: 0 },
            Api::Transport(ref e) if e.is_connect() => CoreError::NoResponse {
                reason: e.to_string(),
            },
            Api::Tls(msg) => CoreError::NoResponse {
                reason: format!("TLS error: {msg}"),
            },
            Api::Deserialization { message, body: _ } => CoreError::Unknown {
                message: format!("Deserialization error: {message}"),
            },
            other @ (Api::Transport(_)
            | Api::UnexpectedStatus { .. }
            | Api::DiscoveryBind { .. }) => CoreError::Unknown {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_codes_pass_through() {
        let err = CoreError::from(ctrlink_api::Error::Controller {
            code: 428,
            message: "panel not found".into(),
        });
        assert_eq!(err.response_code(), ResponseCode::Controller(428));
    }

    #[test]
    fn probe_timeouts_are_no_response() {
        let err = CoreError::from_probe(ctrlink_api::Error::Timeout { timeout_secs: 5 });
        assert_eq!(err.response_code(), ResponseCode::NoResponse);

        let err = CoreError::from(ctrlink_api::Error::Timeout { timeout_secs: 5 });
        assert_eq!(err.response_code(), ResponseCode::Timeout);
    }

    #[test]
    fn url_and_decode_failures() {
        let err = CoreError::from(ctrlink_api::Error::UnusableUrl(String::new()));
        assert_eq!(err.response_code(), ResponseCode::InvalidUrl);

        let err = CoreError::from(ctrlink_api::Error::Deserialization {
            message: "expected value".into(),
            body: String::new(),
        });
        assert_eq!(err.response_code(), ResponseCode::UnknownError);
    }
}
