//! `finrecon churn` - score per-customer churn risk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use finrecon_core::churn::{self, ChurnInputs};
use finrecon_core::profile;

use super::BatchArgs;
use super::ledger::normalize_and_build;

#[derive(Args, Debug)]
pub struct ChurnArgs {
    #[command(flatten)]
    pub batch: BatchArgs,

    /// Path to external churn signals (usage metrics, support tickets,
    /// plan downgrades) as JSON
    #[arg(long)]
    pub signals: Option<PathBuf>,
}

pub fn run(args: &ChurnArgs) -> Result<()> {
    let (_, ledger) = normalize_and_build(&args.batch)?;
    let inputs = read_inputs(args.signals.as_deref())?;
    let thresholds = profile::lookup(&args.batch.profile);
    let risks = churn::score(&ledger, &inputs, &thresholds.churn);
    super::emit(&risks, args.batch.output.as_deref())
}

/// Reads the external signal envelope, defaulting to empty when no file is
/// given.
pub fn read_inputs(path: Option<&Path>) -> Result<ChurnInputs> {
    let Some(path) = path else {
        return Ok(ChurnInputs::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid churn signal file", path.display()))
}
