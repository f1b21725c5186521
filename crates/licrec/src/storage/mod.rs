//! On-disk store for uploaded document bytes.
//!
//! Documents are laid out as `<root>/<session_id>/<file_name>`; the queue
//! carries the resulting path. Filenames are flattened so an upload name
//! can never navigate outside its session directory.

use std::path::{Path, PathBuf};

use crate::error::StorageError;

pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persists an uploaded document, returning its stored path.
    pub fn store(
        &self,
        session_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let dir = self.root.join(session_id);
        std::fs::create_dir_all(&dir).map_err(|e| StorageError::CreateDirectory {
            path: dir.clone(),
            source: e,
        })?;

        let path = dir.join(sanitize_file_name(file_name));
        std::fs::write(&path, bytes).map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: e,
        })?;

        log::debug!("Stored document {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }
}

/// Keeps only the final path component and replaces separator characters.
fn sanitize_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim()
        .trim_matches('.');
    if base.is_empty() {
        "document".to_string()
    } else {
        base.to_string()
    }
}
