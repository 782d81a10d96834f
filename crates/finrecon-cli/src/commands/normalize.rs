//! `finrecon normalize` - validate and normalize a raw event export.

use anyhow::Result;
use clap::Args;
use finrecon_core::events::{self, NormalizerOptions, TenantContext};
use serde_json::json;

use super::BatchArgs;

#[derive(Args, Debug)]
pub struct NormalizeArgs {
    #[command(flatten)]
    pub batch: BatchArgs,
}

pub fn run(args: &NormalizeArgs) -> Result<()> {
    let records = super::read_records(&args.batch.input)?;
    let ctx = TenantContext::new(&args.batch.tenant, &args.batch.project);
    let output = events::normalize(
        &records,
        &ctx,
        NormalizerOptions {
            skip_validation: args.batch.skip_validation,
        },
        args.batch.batch_time(),
    );
    super::emit(
        &json!({
            "events": output.events,
            "errors": output.errors,
            "counts": output.counts,
        }),
        args.batch.output.as_deref(),
    )
}
