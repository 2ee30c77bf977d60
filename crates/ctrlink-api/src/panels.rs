// Panel endpoints
//
// Panel listing and single-panel layouts. Layout records are only decoded
// as far as the session engine needs them (widgets and their sensor links).

use tracing::debug;

use crate::client::{ControllerClient, RestCommand, decode_json};
use crate::error::Error;
use crate::models::{Panel, PanelInfo, PanelInfoList};

impl ControllerClient {
    /// List the panels the controller serves.
    ///
    /// `GET rest/panels/`
    pub async fn list_panels(&self) -> Result<Vec<PanelInfo>, Error> {
        let url = self.rest_url(&["rest", "panels", ""])?;
        let resp = self.send(RestCommand::ListPanels, url, None).await?;
        let list: PanelInfoList = decode_json(&resp)?;
        debug!(count = list.panel.len(), "listed panels");
        Ok(list.panel)
    }

    /// Fetch one panel layout by name.
    ///
    /// `GET rest/panel/{name}`
    pub async fn get_panel(&self, name: &str) -> Result<Panel, Error> {
        let url = self.rest_url(&["rest", "panel", name])?;
        let resp = self.send(RestCommand::GetPanel, url, None).await?;
        decode_json(&resp)
    }
}
