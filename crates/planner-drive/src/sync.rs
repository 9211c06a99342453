//! Sync of the task list with its single Drive file.

use std::sync::Arc;

use planner_core::{SaveStatus, Task};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::client::DriveApi;
use crate::error::DriveError;
use crate::locator::FileLocator;

/// Errors from loading the remote file.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to fetch remote file: {0}")]
    RemoteFetch(#[source] DriveError),

    #[error("failed to write remote file: {0}")]
    RemoteWrite(#[source] DriveError),

    #[error("remote file is not a valid task list: {0}")]
    MalformedRemote(#[from] serde_json::Error),
}

impl SyncError {
    /// Returns true if the user has to sign in again.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::RemoteFetch(e) | Self::RemoteWrite(e) => e.is_auth(),
            Self::MalformedRemote(_) => false,
        }
    }
}

/// Reads and writes the task list file.
pub struct DriveSync {
    api: Arc<dyn DriveApi>,
    locator: FileLocator,
    file_name: String,
    upload_lock: Mutex<()>,
}

impl DriveSync {
    pub fn new(api: Arc<dyn DriveApi>, file_name: impl Into<String>, page_size: u32) -> Self {
        Self {
            locator: FileLocator::new(api.clone(), page_size),
            api,
            file_name: file_name.into(),
            upload_lock: Mutex::new(()),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Downloads a file's raw content.
    pub async fn download(&self, file_id: &str) -> Result<Vec<u8>, SyncError> {
        self.api.get_media(file_id).await.map_err(SyncError::RemoteFetch)
    }

    /// Loads the remote task list; `None` if the file does not exist yet.
    pub async fn load(&self) -> Result<Option<Vec<Task>>, SyncError> {
        let Some(record) = self
            .locator
            .locate(&self.file_name)
            .await
            .map_err(SyncError::RemoteFetch)?
        else {
            info!(name = %self.file_name, "no remote task file yet");
            return Ok(None);
        };

        let body = self.download(&record.id).await?;
        let tasks: Vec<Task> = serde_json::from_slice(&body)?;
        info!(file_id = %record.id, count = tasks.len(), "loaded remote tasks");
        Ok(Some(tasks))
    }

    /// Writes the list to the remote file, creating it on first use.
    async fn write(&self, tasks: &[Task]) -> Result<(), SyncError> {
        let body = serde_json::to_vec(tasks)?;

        // One upload at a time so two first saves cannot both create the file.
        let _guard = self.upload_lock.lock().await;

        let existing = self
            .locator
            .locate(&self.file_name)
            .await
            .map_err(SyncError::RemoteWrite)?;

        match existing {
            Some(record) => {
                self.api
                    .update_file(&record.id, body)
                    .await
                    .map_err(SyncError::RemoteWrite)?;
                info!(file_id = %record.id, count = tasks.len(), "updated remote tasks");
            }
            None => {
                let record = self
                    .api
                    .create_file(&self.file_name, body)
                    .await
                    .map_err(SyncError::RemoteWrite)?;
                info!(file_id = %record.id, count = tasks.len(), "created remote task file");
            }
        }
        Ok(())
    }

    /// Uploads the list and reports the outcome. Never fails.
    pub async fn upload(&self, tasks: &[Task]) -> SaveStatus {
        match self.write(tasks).await {
            Ok(()) => SaveStatus::ok(),
            Err(e) => {
                warn!(error = %e, "upload failed");
                SaveStatus::failed(e.to_string())
            }
        }
    }
}
