pub use filesystem_attachment_store::FilesystemAttachmentStore;
pub use in_memory_attachment_store::InMemoryAttachmentStore;

use crate::api::{extension_for, AttachmentKind, BookId, UserId};

mod filesystem_attachment_store;
mod in_memory_attachment_store;

#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("Attachment {0} not found")]
    NotFound(String),

    #[error("Attachment storage failure {0}")]
    Io(#[from] std::io::Error),
}

/// Largest accepted upload, bigger files are rejected while being read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimit {
    pub bytes: usize,
}

/// Blob storage for covers and PDFs, books keep the returned path
#[async_trait::async_trait]
pub trait AttachmentStore {
    /// Stores the file and returns the path to be recorded on the book
    async fn save(
        &self,
        user_id: UserId,
        book_id: BookId,
        kind: AttachmentKind,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AttachmentError>;

    async fn load(&self, path: &str) -> Result<Vec<u8>, AttachmentError>;

    async fn remove(&self, path: &str) -> Result<(), AttachmentError>;
}

fn file_name(user_id: UserId, book_id: BookId, kind: AttachmentKind, content_type: &str) -> String {
    format!(
        "{}_{}_{}{}",
        user_id,
        book_id,
        kind.field_name(),
        extension_for(content_type)
    )
}
