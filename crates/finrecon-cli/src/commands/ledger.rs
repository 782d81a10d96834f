//! `finrecon ledger` - reconstruct the ledger for one window.

use anyhow::{Context, Result};
use clap::Args;
use finrecon_core::events::{self, NormalizeOutput, NormalizerOptions, TenantContext};
use finrecon_core::ledger::{LedgerBuilder, LedgerState, Period};

use super::BatchArgs;

#[derive(Args, Debug)]
pub struct LedgerArgs {
    #[command(flatten)]
    pub batch: BatchArgs,
}

pub fn run(args: &LedgerArgs) -> Result<()> {
    let (_, ledger) = normalize_and_build(&args.batch)?;
    super::emit(&ledger, args.batch.output.as_deref())
}

/// Normalizes the export and replays it into a ledger. Shared by every
/// command downstream of the ledger stage.
pub fn normalize_and_build(batch: &BatchArgs) -> Result<(NormalizeOutput, LedgerState)> {
    let records = super::read_records(&batch.input)?;
    let ctx = TenantContext::new(&batch.tenant, &batch.project);
    let now = batch.batch_time();
    let normalized = events::normalize(
        &records,
        &ctx,
        NormalizerOptions {
            skip_validation: batch.skip_validation,
        },
        now,
    );
    let period = Period {
        start: batch.period_start,
        end: batch.period_end,
    };
    let ledger = LedgerBuilder::new(ctx, period)
        .build(&normalized.events, now)
        .context("ledger construction failed")?;
    Ok((normalized, ledger))
}
