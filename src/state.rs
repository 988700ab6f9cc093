//! State Store (§4.12): durable JSON state with read/write/lock/unlock.
//!
//! State updates are atomic from the caller's perspective — `write` backs up
//! the prior file to `<path>.bak` before overwriting, and a single `write`
//! call persists the entire snapshot (§3 invariant 6).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MiniformError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub name: String,
    #[serde(rename = "modulePath")]
    pub module_path: Vec<String>,
    pub attributes: serde_json::Value,
}

impl ResourceRecord {
    pub fn new(
        id: impl Into<String>,
        resource_type: impl Into<String>,
        name: impl Into<String>,
        module_path: Vec<String>,
        attributes: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            kind: "Resource".to_string(),
            resource_type: resource_type.into(),
            name: name.into(),
            module_path,
            attributes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentState {
    pub version: u32,
    #[serde(default)]
    pub variables: HashMap<String, HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub resources: HashMap<String, ResourceRecord>,
}

impl Default for CurrentState {
    fn default() -> Self {
        Self {
            version: 1,
            variables: HashMap::new(),
            resources: HashMap::new(),
        }
    }
}

/// File-based advisory lock, released on `unlock()` or on drop as a safety
/// net if the caller forgets (or a panic unwinds past it).
pub struct StateLock {
    lock_path: PathBuf,
}

impl StateLock {
    fn acquire(state_path: &Path) -> Result<Self> {
        let lock_path = lock_path_for(state_path);
        if lock_path.exists() {
            return Err(MiniformError::LockError(format!(
                "state is locked: {}",
                lock_path.display()
            )));
        }
        let info = format!(
            "pid={}\ntime={}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );
        fs::write(&lock_path, info)
            .map_err(|e| MiniformError::state(format!("failed to create lock file: {}", e)))?;
        Ok(Self { lock_path })
    }

    pub fn release(self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path)
                .map_err(|e| MiniformError::state(format!("failed to remove lock file: {}", e)))?;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

fn lock_path_for(state_path: &Path) -> PathBuf {
    let mut s = state_path.as_os_str().to_owned();
    s.push(".lock");
    PathBuf::from(s)
}

fn backup_path_for(state_path: &Path) -> PathBuf {
    let mut s = state_path.as_os_str().to_owned();
    s.push(".bak");
    PathBuf::from(s)
}

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location: `<workdir>/.miniform/state.json`.
    pub fn default_location(working_dir: impl AsRef<Path>) -> Self {
        Self::new(working_dir.as_ref().join(".miniform").join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns an empty default state if the file does not exist yet.
    pub fn read(&self) -> Result<CurrentState> {
        if !self.path.exists() {
            return Ok(CurrentState::default());
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|e| MiniformError::state(format!("failed to read state file: {}", e)))?;
        serde_json::from_str(&content)
            .map_err(|e| MiniformError::state(format!("malformed state file: {}", e)))
    }

    /// Backs up the current file (if any) to `<path>.bak`, then writes the
    /// new state as two-space-indented UTF-8 JSON.
    pub fn write(&self, state: &CurrentState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| MiniformError::state(format!("failed to create state dir: {}", e)))?;
        }

        if self.path.exists() {
            fs::copy(&self.path, backup_path_for(&self.path))
                .map_err(|e| MiniformError::state(format!("failed to back up state file: {}", e)))?;
        }

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| MiniformError::state(format!("failed to serialize state: {}", e)))?;
        fs::write(&self.path, json)
            .map_err(|e| MiniformError::state(format!("failed to write state file: {}", e)))?;
        Ok(())
    }

    /// Acquires the per-file advisory lock. Fails with `LockError` if
    /// another holder's lock file already exists.
    pub fn lock(&self) -> Result<StateLock> {
        StateLock::acquire(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn read_returns_empty_default_when_absent() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let state = store.read().unwrap();
        assert_eq!(state.version, 1);
        assert!(state.resources.is_empty());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let mut state = CurrentState::default();
        state.resources.insert(
            "local_file.a".to_string(),
            ResourceRecord::new("id1", "local_file", "a", vec![], serde_json::json!({"path":"/tmp/a"})),
        );
        store.write(&state).unwrap();
        let read_back = store.read().unwrap();
        assert_eq!(read_back.resources.len(), 1);
        assert_eq!(read_back.resources["local_file.a"].id, "id1");
    }

    #[test]
    fn write_backs_up_prior_file() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        store.write(&CurrentState::default()).unwrap();
        let mut second = CurrentState::default();
        second.version = 2;
        store.write(&second).unwrap();

        let backup_content = fs::read_to_string(dir.path().join("state.json.bak")).unwrap();
        let backup: CurrentState = serde_json::from_str(&backup_content).unwrap();
        assert_eq!(backup.version, 1);
    }

    #[test]
    fn lock_fails_when_already_held() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let lock = store.lock().unwrap();
        let second = store.lock();
        assert!(matches!(second, Err(MiniformError::LockError(_))));
        lock.release().unwrap();
        assert!(store.lock().is_ok());
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        {
            let _lock = store.lock().unwrap();
        }
        assert!(store.lock().is_ok());
    }
}
