use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::Context;

use crate::api::{AttachmentKind, BookId, UserId};
use crate::attachments::{file_name, AttachmentError, AttachmentStore};

/// Keeps attachments as files in a single uploads directory
pub struct FilesystemAttachmentStore {
    directory: PathBuf,
}

impl FilesystemAttachmentStore {
    pub async fn init(directory: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory)
            .await
            .with_context(|| format!("Failed to create uploads directory {:?}", directory))?;
        tracing::info!("Storing attachments in {:?}", directory);
        Ok(Self { directory })
    }
}

fn not_found_or_io(path: &str, err: std::io::Error) -> AttachmentError {
    if err.kind() == ErrorKind::NotFound {
        AttachmentError::NotFound(path.to_string())
    } else {
        AttachmentError::Io(err)
    }
}

#[async_trait::async_trait]
impl AttachmentStore for FilesystemAttachmentStore {
    async fn save(
        &self,
        user_id: UserId,
        book_id: BookId,
        kind: AttachmentKind,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AttachmentError> {
        let path = self
            .directory
            .join(file_name(user_id, book_id, kind, content_type));
        tokio::fs::write(&path, bytes).await?;
        Ok(path.to_string_lossy().into_owned())
    }

    async fn load(&self, path: &str) -> Result<Vec<u8>, AttachmentError> {
        tokio::fs::read(path)
            .await
            .map_err(|err| not_found_or_io(path, err))
    }

    async fn remove(&self, path: &str) -> Result<(), AttachmentError> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|err| not_found_or_io(path, err))
    }
}
