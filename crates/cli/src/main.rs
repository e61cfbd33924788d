use anatomist::Pipeline;
use anyhow::Context;
use clap::Parser;
use common::cache::DigestCache;
use common::config::Config;
use common::{Fetcher, Report};
use oracle::HttpFetcher;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "warden")]
#[command(
    about = "Verify that deployed front ends and store extensions match what CI built",
    long_about = None
)]
struct Cli {
    /// Where to write the report.
    #[arg(default_value = "result.json")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("warning: .env: {}", e);
    }
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;
    if config.github_token.is_none() {
        tracing::warn!("GITHUB_TOKEN is not set; CI queries are unauthenticated and rate limited");
    }

    let ci: Arc<dyn Fetcher> = Arc::new(
        HttpFetcher::new(config.github_token.clone()).context("Failed to build CI client")?,
    );
    let web: Arc<dyn Fetcher> =
        Arc::new(HttpFetcher::anonymous().context("Failed to build HTTP client")?);

    let root = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let pipeline = Pipeline::new(config, ci, web).with_cache(DigestCache::in_dir(&root));

    let report = pipeline.run().await;
    report.write_atomic(&cli.output)?;
    print_summary(&report, &cli.output);
    Ok(())
}

fn print_summary(report: &Report, output: &std::path::Path) {
    println!("+------------------------------------------+");
    println!("| WARDEN                                   |");
    println!("+------------------------------------------+");
    for (target, result) in &report.results {
        println!(
            "| {:<18} {:>4} {:>6} files {:>4} skip |",
            target.as_str(),
            if result.status_ok { "PASS" } else { "FAIL" },
            result.deployed_files.len(),
            result.unverified_files.len()
        );
    }
    println!("+------------------------------------------+");
    println!("Report written to {}", output.display());
}
