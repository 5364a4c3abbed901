//! Runtime configuration.
//!
//! Built once from the command line and handed to `Session::start`; nothing
//! downstream reads the environment or branches on the backend again.

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::identity::Credentials;

/// Which persistence backend a session uses.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local store, gone when the process exits.
    Memory,
    /// One JSON file per collection under the data directory.
    File,
}

/// What the coordinator does with an optimistic change the store refused.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep the local change and notify; the next refresh reconciles.
    #[default]
    Retain,
    /// Undo the local change with its exact inverse, then notify.
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub data_dir: PathBuf,
    pub backend: BackendKind,
    /// Deadline for every persistence call.
    pub timeout_ms: u64,
    pub failure_policy: FailurePolicy,
    /// Quiet period before a patched project is written back.
    pub autosave_ms: u64,
    pub credentials: Credentials,
}

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_AUTOSAVE_MS: u64 = 500;

/// `~/.planet`, or `./.planet` when `HOME` is unset.
pub fn default_data_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".planet")
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: default_data_dir(),
            backend: BackendKind::File,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            failure_policy: FailurePolicy::Retain,
            autosave_ms: DEFAULT_AUTOSAVE_MS,
            credentials: Credentials::default(),
        }
    }
}

impl Config {
    /// In-memory configuration, handy for tests and throwaway sessions.
    pub fn in_memory() -> Self {
        Config { backend: BackendKind::Memory, ..Config::default() }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }

    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_ms)
    }
}
