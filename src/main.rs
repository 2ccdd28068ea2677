//! playcheck - command line entry point

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use playcheck::cli::{Cli, Command, ExtensionsArgs, ScanArgs, SortArgs};
use playcheck::services::{
    CommandProbe, census, init_tracing, sort_by_extension, verify, watch_interrupts,
};

/// Conventional status for a run stopped by SIGINT
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Scan(args) => scan(args).await,
        Command::Extensions(args) => extensions(args).await,
        Command::Sort(args) => sort(args).await,
    }
}

async fn scan(args: ScanArgs) -> Result<ExitCode> {
    let config = args.to_config()?;
    let probe = Arc::new(CommandProbe::with_program(config.probe_program.clone()));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, interrupt).await {
            // Probes still running are not reaped on this path
            std::process::exit(EXIT_INTERRUPTED.into());
        }
    });

    let summary = verify(&config, probe, cancel).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", summary);
    }

    if summary.interrupted {
        Ok(ExitCode::from(EXIT_INTERRUPTED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn extensions(args: ExtensionsArgs) -> Result<ExitCode> {
    let report = tokio::task::spawn_blocking(move || census(&args.directory))
        .await
        .context("Extension census task failed")??;

    if report.total_files == 0 {
        println!("No files found.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("Scanned {} files total.", report.total_files);
    println!();
    println!("{:<20} {:>10}", "Extension", "Count");
    println!("{}", "-".repeat(31));
    for (extension, count) in &report.counts {
        println!("{:<20} {:>10}", extension, count);
    }

    Ok(ExitCode::SUCCESS)
}

async fn sort(args: SortArgs) -> Result<ExitCode> {
    let destination = args.destination.clone();
    let report = tokio::task::spawn_blocking(move || sort_by_extension(&args.source, &args.destination))
        .await
        .context("Sort task failed")??;

    if report.copied.is_empty() && report.failures.is_empty() {
        println!("No files found in source directory.");
        return Ok(ExitCode::SUCCESS);
    }

    for (path, error) in &report.failures {
        eprintln!("Could not copy {}: {}", path.display(), error);
    }
    println!(
        "Sorting complete! {} files organized in: {}",
        report.copied.len(),
        destination.display()
    );

    Ok(ExitCode::SUCCESS)
}
