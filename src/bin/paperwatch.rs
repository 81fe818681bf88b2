use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use paperwatch::{
    config::{
        target_authors_from_env, ArxivConfig, PageConfig, QueryConfig, DEFAULT_DAYS_BACK,
        DEFAULT_MAX_RESULTS, DEFAULT_OUTPUT_PATH, DEFAULT_STORE_PATH,
    },
    pipeline::Pipeline,
};

/// Fetch recent arXiv papers for a topic and/or authors and publish them as a static page.
#[derive(Debug, Parser)]
#[command(name = "paperwatch", version)]
struct Cli {
    /// Topic searched across all fields, e.g. "numerical relativity".
    #[arg(long)]
    query: Option<String>,

    /// Keep papers published within this many days.
    #[arg(long, default_value_t = DEFAULT_DAYS_BACK)]
    days_back: u32,

    /// Cap on papers fetched per run, across all searches.
    #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
    max_results: usize,

    /// Author names, repeatable or comma-separated. Defaults to TARGET_AUTHORS.
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    authors: Vec<String>,

    #[arg(long, default_value = DEFAULT_OUTPUT_PATH)]
    output: PathBuf,

    /// JSON file holding every paper seen so far.
    #[arg(long, default_value = DEFAULT_STORE_PATH)]
    store: PathBuf,

    /// Page heading.
    #[arg(long)]
    title: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("paperwatch=info,warn")),
        )
        .init();

    let cli = Cli::parse();
    let arxiv = ArxivConfig::from_env().context("invalid configuration")?;

    let authors = if cli.authors.is_empty() {
        target_authors_from_env()
    } else {
        cli.authors
    };
    let query = QueryConfig::new(
        cli.query,
        authors,
        cli.days_back,
        cli.max_results,
        cli.output,
        cli.store,
    );
    let mut page = PageConfig::default();
    if let Some(title) = cli.title {
        page.title = title;
    }

    let mut pipeline = Pipeline::new(arxiv, query, page)?;
    let report = pipeline.run().await?;
    info!(
        added = report.merge.added,
        total = report.total,
        failed_requests = report.failed_requests,
        skipped_entries = report.skipped_entries,
        "done"
    );
    Ok(())
}
