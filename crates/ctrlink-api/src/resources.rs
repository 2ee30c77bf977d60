// Resource endpoints
//
// Resources (images and other static assets) live directly under the
// controller base URL, outside the `rest/` tree.

use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_TYPE, LAST_MODIFIED};
use tracing::debug;

use crate::client::{ControllerClient, RestCommand};
use crate::error::Error;
use crate::models::{ResourceData, ResourceDetails};

impl ControllerClient {
    /// Metadata for a resource, from its headers only.
    ///
    /// `HEAD {name}`
    pub async fn resource_details(&self, name: &str) -> Result<ResourceDetails, Error> {
        let url = self.resource_url(name)?;
        let resp = self.send(RestCommand::ResourceDetails, url, None).await?;

        let content_type = resp.header(CONTENT_TYPE.as_str()).map(str::to_owned);
        let last_modified = resp.header(LAST_MODIFIED.as_str()).and_then(parse_http_date);
        debug!(resource = name, ?content_type, ?last_modified, "resource details");

        Ok(ResourceDetails {
            name: name.to_owned(),
            content_type,
            last_modified,
        })
    }

    /// Raw resource bytes.
    ///
    /// `GET {name}`
    pub async fn resource_data(&self, name: &str) -> Result<ResourceData, Error> {
        let url = self.resource_url(name)?;
        let resp = self.send(RestCommand::ResourceData, url, None).await?;
        debug!(resource = name, bytes = resp.body.len(), "resource data");

        Ok(ResourceData {
            name: name.to_owned(),
            content_type: resp.header(CONTENT_TYPE.as_str()).map(str::to_owned),
            data: resp.body,
        })
    }
}

/// `Wed, 21 Oct 2015 07:28:00 GMT`. Unparsable dates are dropped.
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn http_dates_parse() {
        assert_eq!(
            parse_http_date("Wed, 21 Oct 2015 07:28:00 GMT"),
            Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).single()
        );
        assert_eq!(parse_http_date("yesterday"), None);
    }
}
