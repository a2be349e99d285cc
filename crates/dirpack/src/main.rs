mod cli;
mod summary;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Args;
use packing::{FileWalker, PackReport, PackingOrchestrator, TextRenderer};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const REPORT_FILE: &str = "pack-report.json";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_filter().into()),
        )
        .init();

    let config = args.resolve_config()?;
    info!(
        source = %args.source.display(),
        max_groups = config.max_groups,
        workers = config.worker_count,
        "dirpack starting"
    );

    let discovery = FileWalker::new(&args.source)
        .with_exclusions(args.exclude.iter().cloned())
        .discover()
        .with_context(|| format!("discovering files under {}", args.source.display()))?;
    info!(
        files = discovery.files.len(),
        scanned = discovery.total_scanned,
        bytes = discovery.total_bytes(),
        "Discovery complete"
    );

    let cancel = CancellationToken::new();
    let orchestrator = PackingOrchestrator::new(config, TextRenderer::new(&args.output))?
        .with_cancellation(cancel.clone());

    if discovery.files.is_empty() {
        print!("{}", summary::render_nothing_found(&discovery));
        if !args.plan {
            write_report(&args.output, &PackReport::empty()).await?;
        }
        return Ok(());
    }

    let plan = orchestrator.plan(discovery.files)?;
    if args.plan {
        print!("{}", summary::render_plan(&plan));
        return Ok(());
    }

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing in-flight files");
                cancel.cancel();
            }
        }
    });

    let report = orchestrator.execute(plan).await;
    let report_path = write_report(&args.output, &report).await?;

    print!("{}", summary::render_report(&report));
    println!("Report written to {}", report_path.display());

    let failed = summary::failed_groups(&report);
    if failed > 0 {
        anyhow::bail!(
            "{failed} of {} containers could not be written",
            report.groups.len()
        );
    }
    Ok(())
}

async fn write_report(output: &Path, report: &PackReport) -> Result<std::path::PathBuf> {
    tokio::fs::create_dir_all(output)
        .await
        .with_context(|| format!("creating {}", output.display()))?;
    let path = output.join(REPORT_FILE);
    let json = serde_json::to_string_pretty(report)?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
