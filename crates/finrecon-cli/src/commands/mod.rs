//! Subcommand implementations.
//!
//! Every command reads a JSON export from disk, runs one or more core
//! stages, and emits canonically serialized JSON to stdout or a file. All
//! file I/O lives here; the core crate never touches the filesystem.

pub mod anomalies;
pub mod churn;
pub mod ledger;
pub mod normalize;
pub mod reconcile;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use finrecon_core::STABLE_TIMESTAMP;
use finrecon_core::canonical;
use serde::Serialize;
use serde_json::Value;

/// Arguments shared by every batch command.
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Path to the raw event export (JSON array of records)
    pub input: PathBuf,

    /// Tenant identifier
    #[arg(short, long)]
    pub tenant: String,

    /// Project identifier
    #[arg(short, long)]
    pub project: String,

    /// Window start, inclusive (RFC 3339)
    #[arg(long)]
    pub period_start: DateTime<Utc>,

    /// Window end, inclusive (RFC 3339)
    #[arg(long)]
    pub period_end: DateTime<Utc>,

    /// Threshold profile (base, high-volume, strict)
    #[arg(long, default_value = "base")]
    pub profile: String,

    /// Keep every typeable record instead of validating each one
    #[arg(long)]
    pub skip_validation: bool,

    /// Replace wall-clock timestamps with a fixed sentinel
    #[arg(long)]
    pub stable: bool,

    /// Write output here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl BatchArgs {
    /// The batch timestamp: a fixed sentinel under `--stable`, otherwise
    /// the current wall clock.
    pub fn batch_time(&self) -> DateTime<Utc> {
        if self.stable {
            STABLE_TIMESTAMP
                .parse()
                .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC)
        } else {
            Utc::now()
        }
    }
}

/// Reads a JSON array of raw records from disk.
pub fn read_records(path: &Path) -> Result<Vec<Value>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    match value {
        Value::Array(records) => Ok(records),
        _ => anyhow::bail!("{} must contain a JSON array of records", path.display()),
    }
}

/// Serializes a value canonically and writes it to the output target.
pub fn emit<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let as_value = serde_json::to_value(value).context("failed to serialize output")?;
    let text = canonical::serialize(&as_value).context("failed to canonicalize output")?;
    match output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            println!("{text}");
            Ok(())
        },
    }
}
