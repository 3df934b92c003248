use std::{collections::HashMap, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use arxiv_weekly::{
    config::Config,
    fetcher::PaginatedFetcher,
    model::format_utc,
    parser::ArxivParser,
    pipeline,
    storage::LocalSaver,
};

/// Fetch this week's arXiv papers for a topic and keep the interesting ones.
#[derive(Debug, Parser)]
#[command(name = "weekly", version)]
struct Cli {
    /// Env file to load before reading settings (default: weekly.env if present)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Search query, e.g. `cat:cs.CV`
    #[arg(long)]
    query: Option<String>,

    /// Oldest timestamp to keep, RFC 3339 or YYYY-MM-DD
    #[arg(long)]
    cutoff: Option<String>,

    /// Output file path
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Output format: csv, jsonl or markdown
    #[arg(long)]
    format: Option<String>,

    /// File with one boring title substring per line
    #[arg(long)]
    boring_words_file: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        let mut set = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                vars.insert(key.to_string(), value);
            }
        };
        set("QUERY", self.query.clone());
        set("CUTOFF", self.cutoff.clone());
        set("OUTPUT", self.output.as_ref().map(|p| p.display().to_string()));
        set("OUTPUT_FORMAT", self.format.clone());
        set(
            "BORING_WORDS_FILE",
            self.boring_words_file.as_ref().map(|p| p.display().to_string()),
        );
        vars
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::from_env(cli.env_file.as_deref(), &cli.overrides())
        .context("invalid configuration")?;
    let (output_path, output_format) = config.output.resolve(&config.search.cutoff);
    info!(
        query = %config.search.query,
        cutoff = %format_utc(&config.search.cutoff),
        boring_words = config.filter.boring_words.len(),
        "starting weekly fetch"
    );

    let parser = ArxivParser::from_config(&config.search).context("failed to build http client")?;
    let fetcher = PaginatedFetcher::new(parser, config.search.clone(), config.retry.clone());
    let raw = fetcher
        .fetch_all()
        .await
        .context("fetching papers failed; re-run to resume")?;

    let digest = pipeline::run(raw, &config.filter);

    LocalSaver::save(&output_path, output_format, &digest.rows)
        .with_context(|| format!("failed to write {}", output_path.display()))?;
    println!(
        "Found {} papers submitted since {}, saved to {}",
        digest.relevant,
        format_utc(&config.search.cutoff),
        output_path.display()
    );
    Ok(())
}
