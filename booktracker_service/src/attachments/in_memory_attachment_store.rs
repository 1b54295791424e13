use std::collections::HashMap;

use crate::api::{AttachmentKind, BookId, UserId};
use crate::attachments::{file_name, AttachmentError, AttachmentStore};

#[derive(Default)]
pub struct InMemoryAttachmentStore {
    files: parking_lot::RwLock<HashMap<String, Vec<u8>>>,
}

#[cfg(test)]
impl InMemoryAttachmentStore {
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

#[async_trait::async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn save(
        &self,
        user_id: UserId,
        book_id: BookId,
        kind: AttachmentKind,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AttachmentError> {
        let path = format!("memory/{}", file_name(user_id, book_id, kind, content_type));
        self.files.write().insert(path.clone(), bytes);
        Ok(path)
    }

    async fn load(&self, path: &str) -> Result<Vec<u8>, AttachmentError> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| AttachmentError::NotFound(path.to_string()))
    }

    async fn remove(&self, path: &str) -> Result<(), AttachmentError> {
        self.files
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| AttachmentError::NotFound(path.to_string()))
    }
}
