//! Data models for registered computers and their per-user configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Canonical order of the setup fields.
///
/// Non-interactive flag order, interactive prompt order and the documentation
/// all follow this sequence; scripted consumers depend on it staying stable.
pub const SETUP_FIELD_ORDER: &[&str] = &[
    "label",
    "hostname",
    "description",
    "transport",
    "scheduler",
    "shebang",
    "work-dir",
    "mpirun-command",
    "mpiprocs-per-machine",
    "default-memory-per-machine",
    "prepend-text",
    "append-text",
];

/// A registered execution resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Computer {
    /// Unique label identifying this computer
    pub label: String,

    /// Network address of the machine
    pub hostname: String,

    /// Free-text description
    #[serde(default)]
    pub description: String,

    /// Transport identifier (e.g. "local", "ssh")
    pub transport: String,

    /// Scheduler identifier (e.g. "direct", "slurm")
    pub scheduler: String,

    /// First line of generated job scripts, must start with `#!`
    pub shebang: String,

    /// Working directory template, may reference `{username}`
    pub work_dir: String,

    /// MPI launcher template, placeholders restricted to the known
    /// job-resource keys
    pub mpirun_command: String,

    /// Default number of MPI processes per machine; None means unset
    #[serde(default)]
    pub mpiprocs_per_machine: Option<u32>,

    /// Default memory per machine in kilobytes; None means unset
    #[serde(default)]
    pub default_memory_per_machine: Option<u64>,

    /// Shell text executed before every job script
    #[serde(default)]
    pub prepend_text: String,

    /// Shell text executed after every job script
    #[serde(default)]
    pub append_text: String,

    /// Time the record was created
    pub created_at: DateTime<Utc>,
}

impl Computer {
    /// Mpirun command split into argv form, the way job scripts consume it.
    pub fn mpirun_argv(&self) -> Vec<String> {
        self.mpirun_command
            .split_whitespace()
            .map(|s| s.to_string())
            .collect()
    }

    /// Work directory with `{username}` substituted for the given user.
    pub fn work_dir_for(&self, username: &str) -> String {
        self.work_dir.replace("{username}", username)
    }
}

/// Per-(computer, user) connection settings.
///
/// One record exists per pair; it is created the first time a computer is
/// configured for a user and replaced on reconfiguration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthInfo {
    /// Label of the computer this record belongs to
    pub computer_label: String,

    /// User the settings apply to
    pub username: String,

    /// Transport-specific parameters (schema defined by the transport)
    pub auth_params: BTreeMap<String, Value>,

    /// Time the record was last written
    pub updated_at: DateTime<Utc>,
}

impl AuthInfo {
    pub fn new(computer_label: &str, username: &str, auth_params: BTreeMap<String, Value>) -> Self {
        Self {
            computer_label: computer_label.to_string(),
            username: username.to_string(),
            auth_params,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_computer() -> Computer {
        Computer {
            label: "cluster1".to_string(),
            hostname: "cluster1.example.com".to_string(),
            description: String::new(),
            transport: "ssh".to_string(),
            scheduler: "slurm".to_string(),
            shebang: "#!/bin/bash".to_string(),
            work_dir: "/scratch/{username}/ridge_run".to_string(),
            mpirun_command: "mpirun -np {tot_num_mpiprocs}".to_string(),
            mpiprocs_per_machine: Some(36),
            default_memory_per_machine: None,
            prepend_text: String::new(),
            append_text: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_mpirun_argv_splits_on_whitespace() {
        let computer = sample_computer();
        assert_eq!(
            computer.mpirun_argv(),
            vec!["mpirun", "-np", "{tot_num_mpiprocs}"]
        );
    }

    #[test]
    fn test_work_dir_substitutes_username() {
        let computer = sample_computer();
        assert_eq!(computer.work_dir_for("alice"), "/scratch/alice/ridge_run");
    }
}
