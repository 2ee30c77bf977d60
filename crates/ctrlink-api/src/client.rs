// Controller REST client
//
// Turns the closed set of controller commands into transport requests and
// classifies the responses. Each command carries its own method and success
// statuses in `RestCommand`; endpoint methods live in the sibling modules
// (panels, devices, commands, sensors, resources, session) as inherent
// impls so this file stays focused on URL building and response handling.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::ControllerErrorBody;
use crate::transport::{Credentials, Transport, TransportRequest, TransportResponse};

/// Default deadline for ordinary requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Deadline for the long-poll call. Must exceed the controller's own hold
/// time so the controller answers first.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(55_000);

// ── Command table ────────────────────────────────────────────────────

/// Every request the client can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestCommand {
    Connect,
    ListPanels,
    GetPanel,
    ListDevices,
    GetDevice,
    ControlCommand,
    NamedCommand,
    SensorSnapshot,
    PollSensors,
    ResourceDetails,
    ResourceData,
    Logout,
}

impl RestCommand {
    pub fn method(self) -> Method {
        match self {
            Self::ControlCommand | Self::NamedCommand | Self::Logout => Method::POST,
            Self::ResourceDetails => Method::HEAD,
            _ => Method::GET,
        }
    }

    /// HTTP statuses that count as success for this command.
    pub fn success_statuses(self) -> &'static [u16] {
        match self {
            Self::NamedCommand => &[204],
            Self::PollSensors => &[200, 504],
            Self::Logout => &[200, 401],
            _ => &[200],
        }
    }

    pub fn is_success(self, status: u16) -> bool {
        self.success_statuses().contains(&status)
    }
}

// ── Client ───────────────────────────────────────────────────────────

/// Request/response client for one controller.
///
/// Cheap to clone: the transport is shared. The base URL is validated and
/// normalised to end in `/` at construction, so every REST path is built
/// relative to it.
#[derive(Clone)]
pub struct ControllerClient {
    transport: Arc<dyn Transport>,
    base_url: Url,
    credentials: Option<Credentials>,
    request_timeout: Duration,
    poll_timeout: Duration,
}

impl fmt::Debug for ControllerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerClient")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.credentials.is_some())
            .field("request_timeout", &self.request_timeout)
            .field("poll_timeout", &self.poll_timeout)
            .finish_non_exhaustive()
    }
}

impl ControllerClient {
    /// Create a client for the controller at `base_url`.
    ///
    /// Fails with [`Error::UnusableUrl`] for an empty or non-hierarchical
    /// URL and [`Error::InvalidUrl`] for one that does not parse.
    pub fn new(base_url: &str, transport: Arc<dyn Transport>) -> Result<Self, Error> {
        Ok(Self {
            transport,
            base_url: normalize_base_url(base_url)?,
            credentials: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, request: Duration, poll: Duration) -> Self {
        self.request_timeout = request;
        self.poll_timeout = poll;
        self
    }

    /// Same client with a different deadline for ordinary requests. The
    /// long-poll deadline is unchanged.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/seg/seg/...`, with each segment percent-encoded.
    ///
    /// A trailing empty segment yields a trailing slash (`rest/panels/`).
    pub(crate) fn rest_url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| Error::UnusableUrl(self.base_url.to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    /// A resource path relative to the base URL.
    pub(crate) fn resource_url(&self, name: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(name.trim_start_matches('/'))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Issue `command` and return the raw response if its status is one of
    /// the command's success statuses. Anything else becomes an error built
    /// from the structured error body when there is one.
    pub(crate) async fn send(
        &self,
        command: RestCommand,
        url: Url,
        body: Option<String>,
    ) -> Result<TransportResponse, Error> {
        let timeout = match command {
            RestCommand::PollSensors => self.poll_timeout,
            _ => self.request_timeout,
        };
        self.send_with_timeout(command, url, body, timeout).await
    }

    pub(crate) async fn send_with_timeout(
        &self,
        command: RestCommand,
        url: Url,
        body: Option<String>,
        timeout: Duration,
    ) -> Result<TransportResponse, Error> {
        let method = command.method();
        debug!(?command, %method, %url, "controller request");

        let resp = self
            .transport
            .execute(TransportRequest {
                method,
                url,
                body,
                timeout,
                credentials: self.credentials.clone(),
            })
            .await?;

        if command.is_success(resp.status) {
            Ok(resp)
        } else {
            debug!(?command, status = resp.status, "controller rejected request");
            Err(controller_error(&resp))
        }
    }
}

/// Build the error for a non-success response.
pub(crate) fn controller_error(resp: &TransportResponse) -> Error {
    match serde_json::from_slice::<ControllerErrorBody>(&resp.body) {
        Ok(body) => Error::Controller {
            code: body.error.code,
            message: body.error.message.unwrap_or_default(),
        },
        Err(_) => Error::UnexpectedStatus {
            status: resp.status,
        },
    }
}

/// Decode a JSON body, keeping the raw text on failure.
pub(crate) fn decode_json<T: DeserializeOwned>(resp: &TransportResponse) -> Result<T, Error> {
    serde_json::from_slice(&resp.body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: resp.text(),
    })
}

fn normalize_base_url(raw: &str) -> Result<Url, Error> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::UnusableUrl(raw.to_owned()));
    }
    let mut url = Url::parse(trimmed)?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(Error::UnusableUrl(raw.to_owned()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
