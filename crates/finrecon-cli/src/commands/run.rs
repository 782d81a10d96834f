//! `finrecon run` - the full pipeline in one pass.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use finrecon_core::pipeline::{self, PipelineConfig};
use serde_json::json;

use super::BatchArgs;
use super::churn::read_inputs;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub batch: BatchArgs,

    /// Path to external churn signals as JSON
    #[arg(long)]
    pub signals: Option<PathBuf>,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let records = super::read_records(&args.batch.input)?;
    let inputs = read_inputs(args.signals.as_deref())?;
    let config = PipelineConfig {
        tenant_id: args.batch.tenant.clone(),
        project_id: args.batch.project.clone(),
        period_start: args.batch.period_start,
        period_end: args.batch.period_end,
        profile_id: args.batch.profile.clone(),
        skip_validation: args.batch.skip_validation,
        stable_output: args.batch.stable,
    };
    let output = pipeline::run(&config, &records, &inputs)
        .map_err(|e| anyhow::anyhow!("pipeline run failed [{}]: {e}", e.code()))?;

    super::emit(
        &json!({
            "trace_id": output.trace_id,
            "event_count": output.normalized.events.len(),
            "rejected_count": output.normalized.errors.len(),
            "ledger": output.ledger,
            "recon": output.recon,
            "costs": output.costs,
            "anomalies": output.anomalies,
            "churn": output.churn,
            "bundle": output.bundle,
            "report": output.report,
        }),
        args.batch.output.as_deref(),
    )
}
