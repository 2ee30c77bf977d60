// Session endpoints
//
// There is no persistent connection to a controller: "connected" means the
// last probe of `rest/servers` answered 200. Logout is a POST to the base
// URL; a 401 means the credentials were already invalid, which is as good.

use std::time::Duration;

use tracing::{debug, info};

use crate::client::{ControllerClient, RestCommand};
use crate::error::Error;

impl ControllerClient {
    /// Probe the controller.
    ///
    /// `GET rest/servers`, expecting 200.
    pub async fn connect(&self, timeout: Duration) -> Result<(), Error> {
        let url = self.rest_url(&["rest", "servers"])?;
        self.send_with_timeout(RestCommand::Connect, url, None, timeout)
            .await?;
        debug!(url = %self.base_url(), "controller answered");
        Ok(())
    }

    /// Log out of the controller.
    ///
    /// `POST {base}`, 200 or 401.
    pub async fn logout(&self) -> Result<(), Error> {
        let url = self.base_url().clone();
        let resp = self.send(RestCommand::Logout, url, None).await?;
        info!(status = resp.status, "logged out");
        Ok(())
    }
}
