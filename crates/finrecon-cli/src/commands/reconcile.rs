//! `finrecon reconcile` - expected vs. observed MRR for one window.

use anyhow::{Context, Result};
use clap::Args;
use finrecon_core::ledger::Period;
use finrecon_core::recon;
use serde_json::json;

use super::BatchArgs;
use super::ledger::normalize_and_build;

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    #[command(flatten)]
    pub batch: BatchArgs,
}

pub fn run(args: &ReconcileArgs) -> Result<()> {
    let (normalized, ledger) = normalize_and_build(&args.batch)?;
    let report = recon::reconcile(&ledger, args.batch.batch_time())
        .context("reconciliation failed")?;
    let period = Period {
        start: args.batch.period_start,
        end: args.batch.period_end,
    };
    let costs = recon::cost_breakdown(&normalized.events, &period);
    super::emit(
        &json!({
            "report": report,
            "costs": costs,
        }),
        args.batch.output.as_deref(),
    )
}
