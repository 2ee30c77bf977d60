// Command endpoints
//
// Two command styles: control commands addressed to a widget sender id
// (answered with 200) and named device commands (answered with 204). Both
// statuses are success for their respective command.

use serde_json::json;
use tracing::debug;

use crate::client::{ControllerClient, RestCommand};
use crate::error::Error;
use crate::models::{
    CommandResponse, ControlCommand, ControlCommandResponse, NamedCommand, ResponseCode,
};

impl ControllerClient {
    /// Send a control command.
    ///
    /// `POST rest/control/{sender_id}/{data}`
    pub async fn send_control_command(
        &self,
        command: &ControlCommand,
    ) -> Result<ControlCommandResponse, Error> {
        let sender = command.sender_id.to_string();
        let url = self.rest_url(&["rest", "control", &sender, &command.data])?;
        debug!(sender_id = command.sender_id, "sending control command");
        self.send(RestCommand::ControlCommand, url, None).await?;
        Ok(ControlCommandResponse {
            sender_id: command.sender_id,
            code: ResponseCode::Ok,
        })
    }

    /// Send a named command to a device.
    ///
    /// `POST rest/devices/{device}/commands?name={name}`, with body
    /// `{"parameter": "..."}` only when a non-empty parameter is given.
    pub async fn send_named_command(
        &self,
        command: &NamedCommand,
        parameter: Option<&str>,
    ) -> Result<CommandResponse, Error> {
        let mut url = self.rest_url(&["rest", "devices", &command.device, "commands"])?;
        url.query_pairs_mut().append_pair("name", &command.name);

        let body = parameter
            .filter(|p| !p.is_empty())
            .map(|p| json!({ "parameter": p }).to_string());
        debug!(
            device = %command.device,
            command = %command.name,
            has_parameter = body.is_some(),
            "sending named command"
        );

        self.send(RestCommand::NamedCommand, url, body).await?;
        Ok(CommandResponse {
            code: ResponseCode::NoContent,
        })
    }
}
