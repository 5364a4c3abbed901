use std::path::PathBuf;

use clap::Parser;

use planet_board::config::{default_data_dir, BackendKind, Config, FailurePolicy, DEFAULT_TIMEOUT_MS};

use crate::cmd::Commands;

/// Kanban boards for projects, synced to a local document store.
/// Data lives in ~/.planet unless --data-dir says otherwise.
#[derive(Parser)]
#[command(name = "planet", version, about = "Project kanban boards with optimistic sync")]
pub struct Cli {
    /// Directory holding the JSON collections.
    #[arg(long, global = true, env = "PLANET_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Persistence backend.
    #[arg(long, global = true, value_enum, env = "PLANET_BACKEND", default_value_t = BackendKind::File)]
    pub backend: BackendKind,

    /// Deadline for each store call, in milliseconds.
    #[arg(long, global = true, env = "PLANET_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Undo local changes the store refuses instead of keeping them.
    #[arg(long, global = true)]
    pub rollback: bool,

    /// Log filter, e.g. "info" or "planet_board=debug".
    #[arg(long, global = true, env = "PLANET_LOG", default_value = "warn")]
    pub log_level: String,

    #[arg(long, global = true, env = "PLANET_USER", default_value = "planet")]
    pub user: String,

    #[arg(long, global = true, env = "PLANET_PASSWORD", default_value = "planet", hide_env_values = true)]
    pub password: String,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn config(&self) -> Config {
        Config {
            data_dir: self.data_dir.clone().unwrap_or_else(default_data_dir),
            backend: self.backend,
            timeout_ms: self.timeout_ms,
            failure_policy: if self.rollback { FailurePolicy::Rollback } else { FailurePolicy::Retain },
            ..Config::default()
        }
    }
}
