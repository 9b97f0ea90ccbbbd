//! Source file retrieval.
//!
//! The loader only needs "give me the text of this file". [`DirectoryFetcher`]
//! serves a local mirror of the source files and [`MemoryFetcher`] serves
//! fixed content; network transports implement [`SourceFetcher`] the same
//! way.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, SourceError};

/// Retrieves the full text of a named source file.
///
/// Implementations must be shareable across threads: the loader issues
/// fetches for independent parts concurrently.
pub trait SourceFetcher: Send + Sync {
    fn fetch(&self, name: &str) -> Result<String>;
}

/// Reads source files from a directory.
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SourceFetcher for DirectoryFetcher {
    fn fetch(&self, name: &str) -> Result<String> {
        // Names come from the manifest; refuse anything that would escape root.
        if name.contains("..") || Path::new(name).is_absolute() {
            return Err(SourceError::Fetch {
                name: name.to_string(),
                reason: "path escapes source directory".to_string(),
            });
        }
        std::fs::read_to_string(self.root.join(name)).map_err(|e| SourceError::Fetch {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Serves source files from memory.
///
/// # Examples
///
/// ```
/// use catalog_cache_source::{MemoryFetcher, SourceFetcher};
///
/// let fetcher = MemoryFetcher::new().with_file("items.csv", "id,name\n1,Brick\n");
/// assert!(fetcher.fetch("items.csv").is_ok());
/// assert!(fetcher.fetch("variants.csv").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    files: HashMap<String, String>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.files.insert(name.into(), text.into());
    }
}

impl SourceFetcher for MemoryFetcher {
    fn fetch(&self, name: &str) -> Result<String> {
        self.files.get(name).cloned().ok_or_else(|| SourceError::Fetch {
            name: name.to_string(),
            reason: "not found".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_fetcher_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("items.csv"), "id\n1\n").unwrap();
        let fetcher = DirectoryFetcher::new(dir.path());
        assert_eq!(fetcher.fetch("items.csv").unwrap(), "id\n1\n");
    }

    #[test]
    fn test_directory_fetcher_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = DirectoryFetcher::new(dir.path());
        let err = fetcher.fetch("missing.csv").unwrap_err();
        assert!(matches!(err, SourceError::Fetch { ref name, .. } if name == "missing.csv"));
    }

    #[test]
    fn test_directory_fetcher_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = DirectoryFetcher::new(dir.path());
        assert!(fetcher.fetch("../etc/passwd").is_err());
    }
}
