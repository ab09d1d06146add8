use clap::ValueEnum;
use serde::Serialize;
use std::path::PathBuf;

/// Rows per insert transaction when no batch size is configured.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// How the loader treats the target table before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Drop and recreate the table, then load. Idempotent re-seeding.
    Replace,
    /// Insert only, relying on the (id, t) natural key where the backend
    /// enforces it.
    Append,
}

/// What to do when an append-mode target already contains rows. Replace
/// mode always drops and recreates the table, so this policy governs append
/// runs only. Resolved before the run starts; the pipeline never prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingDataPolicy {
    /// Abort before any write.
    Fail,
    /// Clear the table, then load.
    Truncate,
    /// Load on top of the existing rows.
    Append,
}

/// Fully resolved configuration for one seeding run. Built by the CLI layer
/// and passed in explicitly; the pipeline has no ambient defaults.
#[derive(Debug, Clone)]
pub struct SeedConfig {
    /// Path to the source CSV file.
    pub source: PathBuf,
    /// SQLite file path or postgres:// connection URL.
    pub target: String,
    pub batch_size: usize,
    pub mode: LoadMode,
    pub if_exists: ExistingDataPolicy,
}
