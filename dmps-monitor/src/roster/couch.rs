use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{DeviceDescriptor, RosterDocument, RosterError, RosterSource};

const ROSTER_PATH: &str = "deployment_information/dmps";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads the roster document from the CouchDB deployment database.
#[derive(Debug, Clone)]
pub struct CouchRosterSource {
    url: String,
    username: String,
    password: String,
    client: Client,
}

impl CouchRosterSource {
    pub fn new(
        address: impl AsRef<str>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            url: format!("{}/{}", address.as_ref().trim_end_matches('/'), ROSTER_PATH),
            username: username.into(),
            password: password.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RosterSource for CouchRosterSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> Result<Vec<DeviceDescriptor>, RosterError> {
        let response = self
            .client
            .get(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RosterError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        let devices = serde_json::from_slice::<RosterDocument>(&bytes)?.into_descriptors()?;
        debug!(url = %self.url, count = devices.len(), "Fetched roster");
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_cleanly() {
        let source = CouchRosterSource::new("https://couch.example:5984/", "u", "p");
        assert_eq!(source.url(), "https://couch.example:5984/deployment_information/dmps");
    }
}
