use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use nr_core::Result;
use nr_enrich::create_enricher;
use nr_feeds::{FeedParser, PageScraper};
use nr_pipeline::{Pipeline, Scheduler, DEFAULT_MAX_CONCURRENT};
use nr_storage::create_storage;
use tracing::info;

/// Feeds polled when no explicit list is given.
const DEFAULT_FEEDS: &[&str] = &[
    "https://www.theguardian.com/world/rss",
    "https://feeds.bbci.co.uk/news/world/rss.xml",
    "https://www.engadget.com/rss.xml",
    "https://rss.nytimes.com/services/xml/rss/nyt/World.xml",
    "https://feeds.arstechnica.com/arstechnica/index",
];

#[derive(Debug, Clone)]
struct HumanDuration(Duration);

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut total = 0u64;
        let mut digits = String::new();
        for c in s.trim().chars() {
            if c.is_ascii_digit() {
                digits.push(c);
            } else if !c.is_whitespace() {
                let value: u64 = digits
                    .parse()
                    .map_err(|_| format!("expected a number before '{}'", c))?;
                digits.clear();
                total += match c {
                    's' => value,
                    'm' => value * 60,
                    'h' => value * 3600,
                    'd' => value * 86400,
                    _ => return Err(format!("unknown duration unit '{}'", c)),
                };
            }
        }
        // A bare trailing number counts as seconds.
        if !digits.is_empty() {
            total += digits
                .parse::<u64>()
                .map_err(|_| "invalid number".to_string())?;
        }
        if total == 0 {
            return Err("duration must be positive".to_string());
        }
        Ok(HumanDuration(Duration::from_secs(total)))
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "RSS ingestion and enrichment pipeline", long_about = None)]
struct Cli {
    /// Storage backend: memory, or sqlite with the sqlite build feature
    #[arg(long, default_value = "memory")]
    storage: String,

    /// Database file used by the sqlite backend
    #[arg(long, default_value = "newsriver.db")]
    db_path: PathBuf,

    /// Enricher: heuristic (local) or remote (OpenAI-compatible API)
    #[arg(long, default_value = "heuristic")]
    enricher: String,

    /// API key for the remote enricher; NEWSRIVER_API_KEY works too
    #[arg(long)]
    api_key: Option<String>,

    /// Base URL of the remote enrichment API
    #[arg(long)]
    api_base_url: Option<String>,

    /// Model name passed to the remote enrichment API
    #[arg(long)]
    model: Option<String>,

    /// Feed URL to poll; repeat for several. Defaults to the built-in list
    #[arg(long = "feed")]
    feeds: Vec<String>,

    /// File with one feed URL per line (# starts a comment); overrides --feed
    #[arg(long)]
    feeds_file: Option<PathBuf>,

    /// Maximum articles processed concurrently within a run
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT)]
    max_concurrent: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one full pipeline cycle and report the processed count
    Run,
    /// Poll the feed list on an interval, skipping overlapping ticks
    Watch {
        /// Time between runs, e.g. 90s, 15m, 1h30m
        #[arg(long, default_value = "15m")]
        interval: HumanDuration,
    },
    /// Reprocess staged articles that never made it into the published set
    Replay {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show per-feed fetch checkpoints
    Feeds,
    /// Show the most recent published articles as JSON
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show the most recent pipeline runs
    Runs {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn feed_list(cli: &Cli) -> Result<Vec<String>> {
    if let Some(path) = &cli.feeds_file {
        let raw = std::fs::read_to_string(path)?;
        let feeds: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect();
        if feeds.is_empty() {
            return Err(nr_core::Error::Feed(format!(
                "no feeds in {}",
                path.display()
            )));
        }
        return Ok(feeds);
    }
    if !cli.feeds.is_empty() {
        return Ok(cli.feeds.clone());
    }
    Ok(DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let stores = create_storage(&cli.storage, &cli.db_path).await?;
    info!("💾 Storage initialized (using {})", cli.storage);

    let api_key = cli
        .api_key
        .clone()
        .or_else(|| std::env::var("NEWSRIVER_API_KEY").ok());
    let enricher = create_enricher(
        &cli.enricher,
        nr_enrich::Config {
            api_key,
            base_url: cli.api_base_url.clone(),
            model: cli.model.clone(),
        },
    )?;
    info!("🧠 Enricher initialized (using {})", enricher.name());

    let pipeline = Arc::new(Pipeline::new(
        stores.staging.clone(),
        stores.articles.clone(),
        stores.runs.clone(),
        Arc::new(FeedParser::new()?),
        Arc::new(PageScraper::new()?),
        enricher,
        cli.max_concurrent,
    ));

    let feeds = feed_list(&cli)?;

    match cli.command {
        Commands::Run => {
            let summary = pipeline.run(&feeds).await?;
            println!(
                "{}",
                serde_json::json!({
                    "detail": "pipeline complete",
                    "processed_articles": summary.nlp_success,
                })
            );
        }
        Commands::Watch { interval } => {
            let scheduler = Scheduler::new(pipeline, feeds, interval.0);
            scheduler.run_forever().await?;
        }
        Commands::Replay { limit } => {
            let summary = pipeline.replay(limit).await?;
            println!(
                "{}",
                serde_json::json!({
                    "detail": "replay complete",
                    "processed_articles": summary.nlp_success,
                })
            );
        }
        Commands::Feeds => {
            for checkpoint in stores.staging.checkpoints().await? {
                println!(
                    "{}  last fetched {}",
                    checkpoint.url,
                    checkpoint.last_fetched_at.to_rfc3339()
                );
            }
        }
        Commands::Recent { limit } => {
            let articles = stores.articles.list_recent(0, limit).await?;
            println!("{}", serde_json::to_string_pretty(&articles)?);
        }
        Commands::Runs { limit } => {
            for run in stores.runs.recent(limit).await? {
                println!(
                    "{}  fetched={} processed={} nlp_success={} nlp_fail={}",
                    run.timestamp.to_rfc3339(),
                    run.fetched,
                    run.processed,
                    run.nlp_success,
                    run.nlp_fail
                );
            }
        }
    }

    Ok(())
}
