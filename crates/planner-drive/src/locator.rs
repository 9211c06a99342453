//! Finds the task file by name.

use std::sync::Arc;

use tracing::debug;

use crate::client::{DriveApi, FileRecord, ListQuery};
use crate::error::DriveResult;

/// Looks up a file by exact name in the first page of results.
#[derive(Clone)]
pub struct FileLocator {
    api: Arc<dyn DriveApi>,
    page_size: u32,
}

impl FileLocator {
    pub fn new(api: Arc<dyn DriveApi>, page_size: u32) -> Self {
        Self { api, page_size }
    }

    /// Returns the first listed file whose name equals `name`.
    ///
    /// Only one page is inspected. With duplicates the first one in server
    /// order wins.
    pub async fn locate(&self, name: &str) -> DriveResult<Option<FileRecord>> {
        let query = ListQuery {
            name: name.to_string(),
            page_size: self.page_size,
        };
        let files = self.api.list_files(&query).await?;
        let found = first_named(files, name);

        match &found {
            Some(record) => debug!(file_id = %record.id, name, "located file"),
            None => debug!(name, "file not found"),
        }
        Ok(found)
    }
}

fn first_named(files: Vec<FileRecord>, name: &str) -> Option<FileRecord> {
    files.into_iter().find(|f| f.name == name)
}
