//! finrecon - offline billing analysis pipeline.
//!
//! CLI front end for normalizing billing-event exports, reconstructing
//! ledgers, reconciling MRR, detecting anomalies, scoring churn risk, and
//! packaging batch-job requests.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// finrecon - offline billing analysis pipeline
#[derive(Parser, Debug)]
#[command(name = "finrecon")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate and normalize a raw event export
    Normalize(commands::normalize::NormalizeArgs),

    /// Reconstruct the ledger for one window
    Ledger(commands::ledger::LedgerArgs),

    /// Reconcile expected against observed MRR
    Reconcile(commands::reconcile::ReconcileArgs),

    /// Run the anomaly rule battery
    Anomalies(commands::anomalies::AnomaliesArgs),

    /// Score per-customer churn risk
    Churn(commands::churn::ChurnArgs),

    /// Run the full pipeline and emit the job bundle and report
    Run(commands::run::RunArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Normalize(args) => commands::normalize::run(&args),
        Commands::Ledger(args) => commands::ledger::run(&args),
        Commands::Reconcile(args) => commands::reconcile::run(&args),
        Commands::Anomalies(args) => commands::anomalies::run(&args),
        Commands::Churn(args) => commands::churn::run(&args),
        Commands::Run(args) => commands::run::run(&args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_run_invocation() {
        let cli = Cli::try_parse_from([
            "finrecon",
            "run",
            "events.json",
            "--tenant",
            "acme",
            "--project",
            "prod",
            "--period-start",
            "2024-01-01T00:00:00Z",
            "--period-end",
            "2024-01-31T23:59:59Z",
            "--stable",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.batch.tenant, "acme");
        assert!(args.batch.stable);
        assert_eq!(args.batch.profile, "base");
        assert!(args.signals.is_none());
    }

    #[test]
    fn rejects_a_missing_period() {
        let result = Cli::try_parse_from([
            "finrecon",
            "ledger",
            "events.json",
            "--tenant",
            "acme",
            "--project",
            "prod",
        ]);
        assert!(result.is_err());
    }
}
