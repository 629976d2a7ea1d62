use std::path::PathBuf;

use async_trait::async_trait;

use super::{DeviceDescriptor, RosterDocument, RosterError, RosterSource};

/// Reads the roster from a local JSON file on every fetch.
#[derive(Debug, Clone)]
pub struct FileRosterSource {
    path: PathBuf,
}

impl FileRosterSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RosterSource for FileRosterSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> Result<Vec<DeviceDescriptor>, RosterError> {
        let raw = tokio::fs::read(&self.path).await?;
        serde_json::from_slice::<RosterDocument>(&raw)?.into_descriptors()
    }
}
