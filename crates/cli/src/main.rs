//! Batch Classifier - Main Entry Point

use std::io::{self, Write};
use std::process::ExitCode;

use accel_runtime::TractBackend;
use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use cli::{init_logging, run, Cli};
use tracing::info;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    match classify(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn classify(cli: &Cli) -> anyhow::Result<()> {
    let config = cli.resolve_config().context("Failed to load configuration")?;
    init_logging(config.level()?).context("Failed to set tracing subscriber")?;

    info!("=== Batch Classifier v{} ===", env!("CARGO_PKG_VERSION"));

    let backend = TractBackend::new();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = run(cli, &config, &backend, &mut out)?;
    out.flush()?;

    info!("Classified {} images", summary.classified);
    Ok(())
}
