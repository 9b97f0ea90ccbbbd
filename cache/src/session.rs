//! Session-scoped storage state.
//!
//! The circuit breaker's memory lives in an explicit [`SessionState`] value
//! persisted through a [`SessionStore`], so repeated starts within one
//! session keep honoring a disabled structured store.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Breaker state that outlives a single context within a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Structured storage is off for the rest of the session.
    pub disabled: bool,
    pub disabled_reason: Option<String>,
    pub consecutive_failures: u32,
    pub last_failure_at_ms: Option<i64>,
}

/// Where [`SessionState`] is kept.
#[derive(Debug, Clone, Default)]
pub enum SessionStore {
    /// Lives only as long as the process.
    #[default]
    Memory,
    /// JSON file; deleting it ends the session.
    File(PathBuf),
}

impl SessionStore {
    /// Loads the persisted state. A missing or unreadable file yields the
    /// default state.
    pub fn load(&self) -> SessionState {
        let SessionStore::File(path) = self else {
            return SessionState::default();
        };
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return SessionState::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Session state unreadable, starting fresh");
                return SessionState::default();
            }
        };
        serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Session state corrupt, starting fresh");
            SessionState::default()
        })
    }

    pub fn save(&self, state: &SessionState) -> Result<()> {
        if let SessionStore::File(path) = self {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(state)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_always_fresh() {
        let store = SessionStore::Memory;
        store
            .save(&SessionState {
                disabled: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.load(), SessionState::default());
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::File(dir.path().join("nested/session.json"));
        assert_eq!(store.load(), SessionState::default());

        let state = SessionState {
            disabled: true,
            disabled_reason: Some("disk I/O error".into()),
            consecutive_failures: 3,
            last_failure_at_ms: Some(10),
        };
        store.save(&state).unwrap();
        assert_eq!(store.load(), state);
    }

    #[test]
    fn test_corrupt_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{{{").unwrap();
        assert_eq!(SessionStore::File(path).load(), SessionState::default());
    }
}
