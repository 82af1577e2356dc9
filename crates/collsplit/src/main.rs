//! collsplit CLI: split event collections into sub-collections by file GUID.

use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};

use collsplit::{CliArgs, Config, MetricsController, RunOutcome, init_metrics, init_tracing, run};

fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();

    let config = match Config::from_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_metrics() {
        warn!(error = %e, "Metrics disabled");
    }

    info!(
        sources = config.sources.len(),
        output = %config.output.dir.display(),
        dry_run = args.dry_run,
        "Starting collsplit"
    );

    let result = run(&config, args.dry_run);

    if let Some(path) = &config.metrics.snapshot_path {
        match MetricsController::get() {
            Ok(controller) => {
                if let Err(e) = controller.write_snapshot(path) {
                    warn!(error = %e, "Failed to write metrics snapshot");
                }
            }
            Err(e) => warn!(error = %e, "No metrics to snapshot"),
        }
    }

    match result {
        Ok(RunOutcome::Planned(report)) => match report.to_json() {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Split failed: {e}");
                ExitCode::FAILURE
            }
        },
        Ok(RunOutcome::Split(summary)) => {
            let pool = summary.pool_stats();
            info!(
                records = summary.total_records(),
                rows = summary.total_rows_written(),
                partitions = summary.total_partitions(),
                peak_open = pool.peak_open,
                "Done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Split failed: {e}");
            ExitCode::FAILURE
        }
    }
}
