// Sensor endpoints
//
// Snapshot and long-poll share one record shape. The long-poll call has a
// quirk: the controller signals "nothing changed before my deadline" either
// with a 504 status or with a 200 whose body is an error carrying code 504.
// Both, and a client-side timeout on the poll, decode to an empty delta.

use tracing::{debug, trace};

use crate::client::{ControllerClient, RestCommand, controller_error, decode_json};
use crate::error::Error;
use crate::models::{
    ControllerErrorBody, SensorDelta, SensorId, SensorStatusList, join_sensor_ids,
};
use crate::transport::TransportResponse;

const POLL_TIMEOUT_CODE: u16 = 504;

impl ControllerClient {
    /// Current values for `ids`.
    ///
    /// `GET rest/status/{id,id,...}`. An empty id set returns an empty delta
    /// without touching the network.
    pub async fn sensor_values(&self, ids: &[SensorId]) -> Result<SensorDelta, Error> {
        if ids.is_empty() {
            return Ok(SensorDelta::new());
        }
        let url = self.rest_url(&["rest", "status", &join_sensor_ids(ids)])?;
        let resp = self.send(RestCommand::SensorSnapshot, url, None).await?;
        let list: SensorStatusList = decode_json(&resp)?;
        Ok(list.into_delta())
    }

    /// Long-poll for changes to `ids`, keyed by the caller's session token.
    ///
    /// `GET rest/polling/{token}/{id,id,...}` with the poll timeout. Returns
    /// an empty delta when the controller's hold time elapsed with no change.
    pub async fn poll_sensors(&self, token: &str, ids: &[SensorId]) -> Result<SensorDelta, Error> {
        let url = self.rest_url(&["rest", "polling", token, &join_sensor_ids(ids)])?;
        match self.send(RestCommand::PollSensors, url, None).await {
            Ok(resp) => decode_poll(&resp),
            Err(e) if e.is_timeout() => {
                debug!(token, "poll timed out, treating as no change");
                Ok(SensorDelta::new())
            }
            Err(e) => Err(e),
        }
    }
}

/// Decode a long-poll response whose status already passed the success
/// check (200 or 504).
pub fn decode_poll(resp: &TransportResponse) -> Result<SensorDelta, Error> {
    if resp.status == POLL_TIMEOUT_CODE || resp.body.iter().all(u8::is_ascii_whitespace) {
        trace!(status = resp.status, "empty poll result");
        return Ok(SensorDelta::new());
    }

    // The error shape has to be tried first: every field of the status list
    // is optional, so an error body would otherwise decode as "no change".
    if let Ok(err) = serde_json::from_slice::<ControllerErrorBody>(&resp.body) {
        if err.error.code == POLL_TIMEOUT_CODE {
            trace!("poll timeout body, treating as no change");
            return Ok(SensorDelta::new());
        }
        return Err(controller_error(resp));
    }

    let list: SensorStatusList = decode_json(resp)?;
    let delta = list.into_delta();
    trace!(changed = delta.len(), "poll delta");
    Ok(delta)
}
