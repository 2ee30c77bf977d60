// Device endpoints

use tracing::debug;

use crate::client::{ControllerClient, RestCommand, decode_json};
use crate::error::Error;
use crate::models::{Device, DeviceInfo};

impl ControllerClient {
    /// List the devices known to the controller.
    ///
    /// `GET rest/devices/`
    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>, Error> {
        let url = self.rest_url(&["rest", "devices", ""])?;
        let resp = self.send(RestCommand::ListDevices, url, None).await?;
        let devices: Vec<DeviceInfo> = decode_json(&resp)?;
        debug!(count = devices.len(), "listed devices");
        Ok(devices)
    }

    /// Fetch one device, including its commands and sensors.
    ///
    /// `GET rest/devices/{name}`
    pub async fn get_device(&self, name: &str) -> Result<Device, Error> {
        let url = self.rest_url(&["rest", "devices", name])?;
        let resp = self.send(RestCommand::GetDevice, url, None).await?;
        decode_json(&resp)
    }
}
