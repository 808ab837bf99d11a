mod aggregator;
mod analyzer;
mod blocks;
mod classifier;
mod config;
mod explorer;
mod models;
mod parser;
mod price;
mod report;
mod rpc;

use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::aggregator::Summary;
use crate::analyzer::Analyzer;
use crate::config::RunMode;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cfg = config::load()?;

    // RUST_LOG wins; otherwise --quiet drops progress lines.
    let default_level = if cfg.quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    debug!("Loaded config: {:?}", cfg);

    info!("Futures Contract: {}", cfg.futures_contract);
    info!("Mode:             {}", cfg.mode);
    if cfg.tx.is_none() {
        info!("Date Range:       {} to {}", cfg.start.date_naive(), cfg.end.date_naive());
    }

    let mut analyzer = Analyzer::new(&cfg)?;
    let results = match &cfg.tx {
        Some(hash) => analyzer.analyze_single(hash).await?,
        None => analyzer.analyze_range(&cfg).await?,
    };

    let report = aggregator::aggregate(results, cfg.start, cfg.end);

    if report.details.is_empty() {
        warn!("No transactions to write");
    } else {
        report::write_details(&cfg.output, &report.details)?;
        info!("Results written to {}", cfg.output.display());

        // single-tx runs have no meaningful hour span
        if cfg.hourly && cfg.tx.is_none() {
            let path = report::hourly_path(&cfg.output);
            report::write_hourly(&path, &report.hourly)?;
            info!("Hourly summary written to {} ({} hours)", path.display(), report.hourly.len());
        }
    }

    if !cfg.quiet {
        let summary = Summary::from_results(&report.details);
        let heading = match cfg.mode {
            RunMode::SingleWallet(wallet) => wallet.to_string(),
            RunMode::AllWallets { exclude: Some(_) } => "ALL WALLETS (excluding MM)".to_string(),
            RunMode::AllWallets { exclude: None } => "ALL WALLETS".to_string(),
        };
        let breakdown = matches!(cfg.mode, RunMode::AllWallets { .. });
        print!("{}", report::render_summary(&summary, &heading, breakdown));
    }

    Ok(())
}
