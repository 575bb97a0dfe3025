//! File-backed persistence for computers and auth records.
//!
//! The store is the persistence collaborator of the command layer: a single
//! JSON document that is loaded on open and rewritten after every mutation.
//! Uniqueness of labels is enforced here on insert and rename.

use anyhow::Context;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{Result, RidgeError};
use crate::models::{AuthInfo, Computer};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    computers: Vec<Computer>,
    #[serde(default)]
    auth_infos: Vec<AuthInfo>,
}

/// JSON-file store of registered computers.
pub struct ComputerStore {
    path: PathBuf,
    data: StoreData,
}

impl ComputerStore {
    /// Open a store, creating an empty one if the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read store file {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("store file {} is corrupt", path.display()))?
        } else {
            StoreData::default()
        };
        debug!(
            "opened computer store {} ({} computers)",
            path.display(),
            data.computers.len()
        );
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&self.data).context("serializing store")?;
        fs::write(&self.path, content)
            .with_context(|| format!("failed to write store file {}", self.path.display()))?;
        Ok(())
    }

    /// All registered computers, in insertion order.
    pub fn computers(&self) -> &[Computer] {
        &self.data.computers
    }

    /// All registered labels.
    pub fn labels(&self) -> Vec<&str> {
        self.data.computers.iter().map(|c| c.label.as_str()).collect()
    }

    /// Look up a computer by label.
    pub fn get(&self, label: &str) -> Result<&Computer> {
        self.data
            .computers
            .iter()
            .find(|c| c.label == label)
            .ok_or_else(|| RidgeError::NotFound {
                label: label.to_string(),
            })
    }

    /// Insert a new computer; the label must be unused.
    pub fn add(&mut self, computer: Computer) -> Result<()> {
        if self.data.computers.iter().any(|c| c.label == computer.label) {
            return Err(RidgeError::Conflict {
                label: computer.label,
            });
        }
        self.data.computers.push(computer);
        self.save()
    }

    /// Rename a computer, carrying its auth records along.
    pub fn relabel(&mut self, old_label: &str, new_label: &str) -> Result<()> {
        if self.data.computers.iter().any(|c| c.label == new_label) {
            return Err(RidgeError::Conflict {
                label: new_label.to_string(),
            });
        }
        let computer = self
            .data
            .computers
            .iter_mut()
            .find(|c| c.label == old_label)
            .ok_or_else(|| RidgeError::NotFound {
                label: old_label.to_string(),
            })?;
        computer.label = new_label.to_string();
        for auth in &mut self.data.auth_infos {
            if auth.computer_label == old_label {
                auth.computer_label = new_label.to_string();
            }
        }
        self.save()
    }

    /// Remove a computer and cascade its auth records.
    pub fn delete(&mut self, label: &str) -> Result<()> {
        let before = self.data.computers.len();
        self.data.computers.retain(|c| c.label != label);
        if self.data.computers.len() == before {
            return Err(RidgeError::NotFound {
                label: label.to_string(),
            });
        }
        self.data.auth_infos.retain(|a| a.computer_label != label);
        self.save()
    }

    /// Store or replace the auth record for a (computer, user) pair.
    pub fn set_auth_info(&mut self, auth: AuthInfo) -> Result<()> {
        // The computer must exist; configuring a deleted resource is a bug.
        self.get(&auth.computer_label)?;
        self.data
            .auth_infos
            .retain(|a| !(a.computer_label == auth.computer_label && a.username == auth.username));
        self.data.auth_infos.push(auth);
        self.save()
    }

    /// Auth record for a (computer, user) pair, if one exists.
    pub fn auth_info(&self, label: &str, username: &str) -> Option<&AuthInfo> {
        self.data
            .auth_infos
            .iter()
            .find(|a| a.computer_label == label && a.username == username)
    }

    /// A computer is configured for a user iff an auth record exists.
    pub fn is_configured(&self, label: &str, username: &str) -> bool {
        self.auth_info(label, username).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn computer(label: &str) -> Computer {
        Computer {
            label: label.to_string(),
            hostname: "localhost".to_string(),
            description: String::new(),
            transport: "local".to_string(),
            scheduler: "direct".to_string(),
            shebang: "#!/bin/bash".to_string(),
            work_dir: "/tmp/ridge".to_string(),
            mpirun_command: "mpirun".to_string(),
            mpiprocs_per_machine: None,
            default_memory_per_machine: None,
            prepend_text: String::new(),
            append_text: String::new(),
            created_at: Utc::now(),
        }
    }

    fn open_store(dir: &TempDir) -> ComputerStore {
        ComputerStore::open(dir.path().join("computers.json")).unwrap()
    }

    #[test]
    fn test_add_and_get() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.add(computer("c1")).unwrap();
        assert_eq!(store.get("c1").unwrap().hostname, "localhost");
        assert!(matches!(
            store.get("missing").unwrap_err(),
            RidgeError::NotFound { .. }
        ));
    }

    #[test]
    fn test_add_duplicate_label_fails() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.add(computer("c1")).unwrap();
        let err = store.add(computer("c1")).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = open_store(&dir);
            store.add(computer("c1")).unwrap();
        }
        let store = open_store(&dir);
        assert_eq!(store.labels(), vec!["c1"]);
    }

    #[test]
    fn test_relabel_moves_auth_records() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.add(computer("c1")).unwrap();
        store
            .set_auth_info(AuthInfo::new("c1", "alice", BTreeMap::new()))
            .unwrap();

        store.relabel("c1", "c2").unwrap();
        assert!(store.get("c1").is_err());
        assert!(store.get("c2").is_ok());
        assert!(store.is_configured("c2", "alice"));
        assert!(!store.is_configured("c1", "alice"));
    }

    #[test]
    fn test_delete_cascades_auth_records() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.add(computer("c1")).unwrap();
        store
            .set_auth_info(AuthInfo::new("c1", "alice", BTreeMap::new()))
            .unwrap();

        store.delete("c1").unwrap();
        assert!(store.get("c1").is_err());
        assert!(store.auth_info("c1", "alice").is_none());
    }

    #[test]
    fn test_set_auth_info_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.add(computer("c1")).unwrap();

        let mut params = BTreeMap::new();
        params.insert("port".to_string(), serde_json::Value::from(22));
        store
            .set_auth_info(AuthInfo::new("c1", "alice", params))
            .unwrap();

        let mut params = BTreeMap::new();
        params.insert("port".to_string(), serde_json::Value::from(2222));
        store
            .set_auth_info(AuthInfo::new("c1", "alice", params))
            .unwrap();

        let auth = store.auth_info("c1", "alice").unwrap();
        assert_eq!(auth.auth_params["port"], serde_json::Value::from(2222));
    }
}
