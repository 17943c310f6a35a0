//! In-memory mock filesystem for testing collectors without real `/proc`.

use crate::collector::traits::FileSystem;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// In-memory filesystem for testing.
///
/// Clones share their contents, so a test can keep one handle and rewrite
/// files between samples while the collector reads through another.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: Arc<RwLock<HashMap<PathBuf, String>>>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file with the given content.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(path.as_ref().to_path_buf(), content.into());
        }
    }

    pub fn remove_file(&self, path: impl AsRef<Path>) {
        if let Ok(mut files) = self.files.write() {
            files.remove(path.as_ref());
        }
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let files = self
            .files
            .read()
            .map_err(|_| io::Error::other("mock filesystem lock poisoned"))?;
        files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }
}
