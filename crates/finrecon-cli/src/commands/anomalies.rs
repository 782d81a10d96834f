//! `finrecon anomalies` - run the anomaly rule battery.

use anyhow::Result;
use clap::Args;
use finrecon_core::anomaly;
use finrecon_core::profile;

use super::BatchArgs;
use super::ledger::normalize_and_build;

#[derive(Args, Debug)]
pub struct AnomaliesArgs {
    #[command(flatten)]
    pub batch: BatchArgs,
}

pub fn run(args: &AnomaliesArgs) -> Result<()> {
    let (normalized, ledger) = normalize_and_build(&args.batch)?;
    let thresholds = profile::lookup(&args.batch.profile);
    let anomalies = anomaly::detect(
        &normalized.events,
        &ledger,
        &thresholds.anomaly,
        args.batch.batch_time(),
    );
    super::emit(&anomalies, args.batch.output.as_deref())
}
