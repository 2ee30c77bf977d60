//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and distinct exit codes.

use miette::Diagnostic;
use thiserror::Error;

use ctrlink_config::ConfigError;
use ctrlink_core::{CoreError, ResponseCode};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to controller at {url}")]
    #[diagnostic(
        code(ctrlink::connection_failed),
        help(
            "Check that the controller is running and reachable.\n\
             URL: {url}\n\
             Try: ctrlink discover"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Controller URL {url:?} is not usable: {reason}")]
    #[diagnostic(
        code(ctrlink::invalid_url),
        help("Use an absolute http(s) URL, e.g. http://192.168.1.20:8080/controller")
    )]
    InvalidUrl { url: String, reason: String },

    #[error("Connection to the controller was lost")]
    #[diagnostic(code(ctrlink::disconnected))]
    Disconnected,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed")]
    #[diagnostic(
        code(ctrlink::auth_failed),
        help(
            "Verify the username and password for profile '{profile}'.\n\
             Set CTRLINK_PASSWORD or store it in the keyring under \"ctrlink\"."
        )
    )]
    AuthFailed { profile: String },

    #[error("No password configured for user '{username}' in profile '{profile}'")]
    #[diagnostic(
        code(ctrlink::no_credentials),
        help("Set CTRLINK_PASSWORD, pass --password, or set password_env in the profile.")
    )]
    NoCredentials { profile: String, username: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(ctrlink::not_found),
        help("Run: ctrlink {list_command} to see what the controller has")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Controller ───────────────────────────────────────────────────
    #[error("Controller error ({code}): {message}")]
    #[diagnostic(code(ctrlink::controller_error))]
    Controller { code: ResponseCode, message: String },

    #[error("Registration for {target} failed: {code}")]
    #[diagnostic(code(ctrlink::registration_failed))]
    Registration { target: String, code: ResponseCode },

    #[error("Discovery could not start: {reason}")]
    #[diagnostic(
        code(ctrlink::discovery),
        help("Another search may hold the port. Try --port with a free port.")
    )]
    Discovery { reason: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(ctrlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(ctrlink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: ctrlink config set-profile {name} --url <URL>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No controller configured")]
    #[diagnostic(
        code(ctrlink::no_config),
        help(
            "Pass --controller <URL>, set CTRLINK_CONTROLLER, or create a profile with:\n\
             ctrlink config set-profile default --url <URL>\n\
             Config file: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(ctrlink::config))]
    Config(Box<ConfigError>),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(ctrlink::timeout),
        help("Increase timeout with --timeout or check controller responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON output failed: {0}")]
    #[diagnostic(code(ctrlink::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected | Self::Discovery { .. } => {
                exit_code::CONNECTION
            }
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::InvalidUrl { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile, username } => {
                CliError::NoCredentials { profile, username }
            }
            ConfigError::Validation { field, reason } if field == "controller" => {
                CliError::InvalidUrl {
                    url: String::new(),
                    reason,
                }
            }
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidUrl { url, reason } => CliError::InvalidUrl { url, reason },

            CoreError::NoResponse { reason } => CliError::ConnectionFailed {
                url: "(controller)".into(),
                reason,
            },

            CoreError::Disconnected => CliError::Disconnected,

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::Controller { code: 401, .. } => CliError::AuthFailed {
                profile: "current".into(),
            },

            CoreError::Controller { code, message } => CliError::Controller {
                code: ResponseCode::from_controller(code),
                message,
            },

            CoreError::AlreadyRegistered { subscriber } => CliError::Registration {
                target: subscriber,
                code: ResponseCode::AlreadyRegistered,
            },

            CoreError::NullTarget => CliError::Validation {
                field: "name".into(),
                reason: "must not be empty".into(),
            },

            CoreError::Unregistered => CliError::Registration {
                target: "subscriber".into(),
                code: ResponseCode::Unregistered,
            },

            CoreError::Unknown { message } => CliError::Controller {
                code: ResponseCode::UnknownError,
                message,
            },
        }
    }
}
