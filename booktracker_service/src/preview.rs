//! Local previews of downloaded attachments.
//!
//! Every preview is written to its own temporary file which lives exactly as
//! long as the [`PreviewFile`] owning it.

use std::io;
use std::path::{Path, PathBuf};

/// Temporary file removed when dropped
#[derive(Debug)]
pub struct PreviewFile {
    path: PathBuf,
}

impl PreviewFile {
    pub fn create(directory: &Path, bytes: &[u8], extension: &str) -> io::Result<Self> {
        let path = directory.join(format!(
            "booktracker-preview-{}.{}",
            uuid::Uuid::new_v4(),
            extension
        ));
        std::fs::write(&path, bytes)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PreviewFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove preview {:?}: {}", self.path, err);
        }
    }
}

/// Holds the single preview currently shown, showing another one releases it
#[derive(Debug)]
pub struct PreviewSlot {
    directory: PathBuf,
    current: Option<PreviewFile>,
}

impl PreviewSlot {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            current: None,
        }
    }

    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn show(&mut self, bytes: &[u8], extension: &str) -> io::Result<&Path> {
        self.close();
        let preview = self
            .current
            .insert(PreviewFile::create(&self.directory, bytes, extension)?);
        Ok(preview.path())
    }

    pub fn close(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<&Path> {
        self.current.as_ref().map(PreviewFile::path)
    }
}
