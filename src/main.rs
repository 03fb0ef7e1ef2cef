use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use keyscout::config::AppConfig;
use keyscout::crawler::Crawler;
use keyscout::llm::LlmClient;
use keyscout::metrics::MetricsClient;
use keyscout::models::AnalysisOutcome;
use keyscout::pipeline::AnalysisPipeline;
use keyscout::storage::StorageManager;

#[derive(Parser)]
#[command(name = "keyscout")]
#[command(about = "Keyword discovery and opportunity scoring for a website")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(short, long, help = "Configuration file path")]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a website and produce scored keyword opportunities
    Analyze {
        #[arg(help = "Website URL to analyze")]
        url: String,

        #[arg(short, long, default_value = "cli", help = "Owner id the analysis is stored under")]
        owner: String,

        #[arg(long, help = "Re-run even if a fresh analysis exists")]
        force: bool,
    },

    /// Show a stored analysis: top keywords and clusters
    Show {
        #[arg(help = "Analysis id")]
        analysis_id: String,

        #[arg(short, long, default_value_t = 25, help = "How many keywords to print")]
        limit: usize,
    },
}

/// Default filter directive: `--verbose` wins, then the configured
/// level; `RUST_LOG` overrides both at the subscriber
fn log_directive(verbose: bool, configured_level: &str) -> String {
    let level = if verbose { "debug" } else { configured_level };
    format!("keyscout={}", level)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path).await?,
        None => AppConfig::load().await?,
    };
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_directive(cli.verbose, &config.logging.level))),
        )
        .init();

    info!("Starting keyscout v{}", env!("CARGO_PKG_VERSION"));

    let storage = Arc::new(StorageManager::new(&config.database).await?);

    match cli.command {
        Commands::Analyze { url, owner, force } => {
            let pipeline = AnalysisPipeline::new(
                Arc::new(Crawler::new(&config.crawler)?),
                Arc::new(LlmClient::new(&config.llm)?),
                Arc::new(MetricsClient::new(&config.metrics)?),
                storage,
                config.pipeline.clone(),
            );

            match pipeline.run(&owner, &url, force).await {
                Ok(AnalysisOutcome::Cached { analysis_id }) => {
                    println!("Served cached analysis {}", analysis_id);
                    println!("Re-run with --force for a fresh one.");
                }
                Ok(AnalysisOutcome::Fresh { analysis_id, stats }) => {
                    println!("Analysis {} complete", analysis_id);
                    println!("  keywords:        {}", stats.total_keywords);
                    println!("  with volume:     {}", stats.with_volume);
                    println!("  expanded:        {}", stats.expanded);
                    println!("  from rivals:     {}", stats.from_competitors);
                    println!("  with SERP data:  {}", stats.with_serp_data);
                    println!("  clusters:        {}", stats.clusters);
                    println!("View it with: keyscout show {}", analysis_id);
                }
                Err(e) => {
                    error!("Analysis failed ({}): {}", e.category(), e);
                    return Err(e.into());
                }
            }
        }
        Commands::Show { analysis_id, limit } => {
            let record = match storage.get_analysis(&analysis_id).await? {
                Some(record) => record,
                None => {
                    println!("No analysis with id {}", analysis_id);
                    return Ok(());
                }
            };

            println!("{} ({})", record.url, record.created_at.format("%Y-%m-%d %H:%M UTC"));
            println!("{}", record.product_summary);
            println!();

            let keywords = storage.top_keywords(&analysis_id, limit).await?;
            println!("Top {} keywords:", keywords.len());
            for kw in &keywords {
                println!(
                    "  {:>5}  vol {:>7}  cpc {:>5.2}  {:<7}  {}",
                    kw.opportunity_score,
                    kw.search_volume,
                    kw.cpc,
                    format!("{:?}", kw.competition_level).to_lowercase(),
                    kw.keyword
                );
            }

            let clusters = storage.clusters_for(&analysis_id).await?;
            if !clusters.is_empty() {
                println!();
                println!("Clusters:");
                for c in &clusters {
                    println!(
                        "  {} - pillar '{}', {} supporting, volume {}",
                        c.article_title,
                        c.pillar_keyword,
                        c.supporting_keywords.len(),
                        c.total_volume
                    );
                }
            }
        }
    }

    Ok(())
}
