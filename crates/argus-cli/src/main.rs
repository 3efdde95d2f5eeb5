mod config;
mod export;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use argus_client::{ClaudeExtractor, HttpFetcher, PageCleaner};
use argus_core::circuit::Circuit;
use argus_core::manual::load_manual_records;
use argus_core::models::{ItemStatus, Profile, Source};
use argus_core::noise::PatternNoiseFilter;
use argus_core::pace::PacedFetcher;
use argus_core::publish::{Publication, PublishedItem, history, publish};
use argus_core::reconcile::reconcile;
use argus_core::scan::{ScanConfig, ScanService};
use argus_db::{Database, DatabaseConfig};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "argus", version, about = "Regulatory change monitoring and reconciliation")]
struct Cli {
    /// Directory holding sources.yaml, profile.yaml, manual.yaml and
    /// settings.yaml
    #[arg(long, global = true, default_value = "config")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run migrations and register sources from sources.yaml
    Init,

    /// Run a full scan: fetch, detect, extract, reconcile, publish
    Scan {
        /// Anthropic API key for the extraction service
        #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Extraction model override
        #[arg(long, env = "ARGUS_MODEL")]
        model: Option<String>,

        /// Where the published item set is written
        #[arg(long, default_value = "data/publication.json")]
        out: PathBuf,
    },

    /// List items from the last published set
    Items {
        /// Minimum relevance score (1-10)
        #[arg(long, default_value_t = 0)]
        min_relevance: u8,

        /// Include past-deadline items (full history)
        #[arg(long)]
        all: bool,

        /// Published set to read
        #[arg(long, default_value = "data/publication.json")]
        data: PathBuf,
    },

    /// Export the published set to CSV or JSON
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,

        /// Output file
        #[arg(long)]
        out: PathBuf,

        /// Minimum relevance score (1-10)
        #[arg(long, default_value_t = 0)]
        min_relevance: u8,

        /// Published set to read
        #[arg(long, default_value = "data/publication.json")]
        data: PathBuf,
    },

    /// Show summary statistics for the published set
    Stats {
        /// Published set to read
        #[arg(long, default_value = "data/publication.json")]
        data: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("argus=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => cmd_init(&cli.config_dir).await,
        Commands::Scan {
            api_key,
            model,
            out,
        } => cmd_scan(&cli.config_dir, &api_key, model, &out).await,
        Commands::Items {
            min_relevance,
            all,
            data,
        } => cmd_items(&cli.config_dir, min_relevance, all, &data),
        Commands::Export {
            format,
            out,
            min_relevance,
            data,
        } => cmd_export(format, &out, min_relevance, &data),
        Commands::Stats { data } => cmd_stats(&data),
    }
}

/// Connect to PostgreSQL and run pending migrations.
async fn connect_db() -> Result<Database> {
    let db_config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let db = Database::connect(&db_config)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(db)
}

async fn cmd_init(config_dir: &Path) -> Result<()> {
    let db = connect_db().await?;
    let sources = config::load_sources(&config_dir.join("sources.yaml"))?;

    println!("Registering {} sources...", sources.len());
    let repo = db.source_repo();
    for source in &sources {
        let stored = repo.upsert(source).await.map_err(|e| anyhow::anyhow!(e))?;
        println!("  [OK] {} ({})", stored.name, stored.url);
    }

    println!("\nInitialization complete.");
    println!("Next: set ANTHROPIC_API_KEY and run `argus scan`.");
    Ok(())
}

async fn cmd_scan(
    config_dir: &Path,
    api_key: &str,
    model: Option<String>,
    out: &Path,
) -> Result<()> {
    let db = connect_db().await?;
    let profile: Profile = config::load_profile(&config_dir.join("profile.yaml"))?;
    let settings: Settings = config::load_settings(&config_dir.join("settings.yaml"))?;
    let manual = load_manual_records(&config_dir.join("manual.yaml"))
        .map_err(|e| anyhow::anyhow!(e))?;

    let sources: Vec<Source> = db
        .source_repo()
        .list_active()
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    if sources.is_empty() {
        anyhow::bail!("no active sources registered. Run `argus init` first.");
    }

    let fetcher = PacedFetcher::new(
        HttpFetcher::new().map_err(|e| anyhow::anyhow!(e))?,
        Duration::from_millis(settings.min_request_delay_ms),
    );
    let mut extractor = ClaudeExtractor::new(api_key).map_err(|e| anyhow::anyhow!(e))?;
    if let Some(model) = model {
        extractor = extractor.with_model(model);
    }

    let service = ScanService::new(
        fetcher,
        PageCleaner::new(),
        extractor,
        db.snapshot_repo(),
        db.change_repo(),
        PatternNoiseFilter::default(),
        Circuit::default(),
        ScanConfig {
            max_concurrent_fetches: settings.max_concurrent_fetches,
            extract_concurrency: settings.extract_concurrency,
            backlog_limit: settings.backlog_limit,
        },
    );

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight work");
            ctrl_c_cancel.cancel();
        }
    });

    println!("Scanning {} sources...", sources.len());
    let outcome = service.run(&sources, &profile, &cancel).await;

    let reconciled = reconcile(manual, outcome.automated);
    let now = Utc::now();
    let today = now.date_naive();

    // The full, unfiltered set is the durable artifact; views re-filter.
    let full = history(&reconciled.items, today, settings.due_soon_days, now);
    export::write_json(&full, out)?;

    let current = publish(&reconciled.items, today, settings.due_soon_days, now);

    println!("\nScan report:");
    println!("  Sources scanned:      {}", outcome.report.sources_scanned);
    println!("  Snapshots recorded:   {}", outcome.report.snapshots_recorded);
    println!("  Changes detected:     {}", outcome.report.changes_detected);
    println!("  Candidates extracted: {}", outcome.report.candidates_extracted);
    println!("  Errors:               {}", outcome.report.errors);
    println!("  Candidates dropped:   {}", reconciled.dropped.len());
    println!(
        "\nPublished {} items ({} in history) -> {}",
        current.items.len(),
        full.items.len(),
        out.display()
    );
    print_items(&current.items);
    Ok(())
}

fn cmd_items(config_dir: &Path, min_relevance: u8, all: bool, data: &Path) -> Result<()> {
    let settings = config::load_settings(&config_dir.join("settings.yaml"))?;
    let publication = load_publication(data)?;
    let today = Utc::now().date_naive();

    let items: Vec<PublishedItem> = publication
        .items
        .into_iter()
        .filter(|item| item.relevance >= min_relevance)
        .filter(|item| all || item.deadline.is_none_or(|d| d >= today))
        .map(|mut item| {
            item.status = ItemStatus::classify(item.deadline, today, settings.due_soon_days);
            item
        })
        .collect();

    if items.is_empty() {
        println!("No compliance items match.");
        return Ok(());
    }

    println!(
        "{} items (as of {}, last updated {}):",
        items.len(),
        today,
        publication.last_updated.format("%Y-%m-%d %H:%M UTC")
    );
    print_items(&items);
    Ok(())
}

fn cmd_export(format: ExportFormat, out: &Path, min_relevance: u8, data: &Path) -> Result<()> {
    let mut publication = load_publication(data)?;
    publication
        .items
        .retain(|item| item.relevance >= min_relevance);
    publication.total_items = publication.items.len();

    match format {
        ExportFormat::Csv => export::write_csv(&publication, out)?,
        ExportFormat::Json => export::write_json(&publication, out)?,
    }
    println!("Exported {} items -> {}", publication.items.len(), out.display());
    Ok(())
}

fn cmd_stats(data: &Path) -> Result<()> {
    let publication = load_publication(data)?;
    let today = Utc::now().date_naive();

    let total = publication.items.len();
    let count_impact = |target: &str| {
        publication
            .items
            .iter()
            .filter(|i| format!("{:?}", i.impact).eq_ignore_ascii_case(target))
            .count()
    };
    let with_deadline = publication
        .items
        .iter()
        .filter(|i| i.deadline.is_some())
        .count();
    let urgent = publication
        .items
        .iter()
        .filter_map(|i| i.deadline)
        .filter(|d| {
            let days = (*d - today).num_days();
            (0..30).contains(&days)
        })
        .count();
    let overdue = publication
        .items
        .iter()
        .filter(|i| i.deadline.is_some_and(|d| d < today))
        .count();

    println!("=== Compliance Monitor Statistics ===\n");
    println!("Total items:   {total}");
    println!("  High impact:   {}", count_impact("high"));
    println!("  Medium impact: {}", count_impact("medium"));
    println!("  Low impact:    {}", count_impact("low"));
    println!("\nWith deadline: {with_deadline}");
    println!("Urgent (< 30 days): {urgent}");
    println!("Overdue: {overdue}");
    Ok(())
}

fn load_publication(path: &Path) -> Result<Publication> {
    let raw = std::fs::read_to_string(path).with_context(|| {
        format!(
            "failed to read {}. Run `argus scan` to produce it.",
            path.display()
        )
    })?;
    serde_json::from_str(&raw).with_context(|| format!("invalid publication {}", path.display()))
}

fn print_items(items: &[PublishedItem]) {
    for item in items {
        let impact = match format!("{:?}", item.impact).to_lowercase().as_str() {
            "high" => "[H]",
            "low" => "[L]",
            _ => "[M]",
        };
        let deadline = item
            .deadline
            .map(|d| d.to_string())
            .unwrap_or_else(|| "no deadline".to_string());
        println!(
            "\n{impact} {} — {} — relevance {}/10 ({})",
            item.title, deadline, item.relevance, item.origin
        );
        if !item.summary.is_empty() {
            println!("    {}", item.summary);
        }
        if !item.regions.is_empty() {
            println!("    Regions: {}", item.regions.join(", "));
        }
        if !item.requirements.is_empty() {
            for req in item.requirements.iter().take(5) {
                println!("    - {req}");
            }
        }
        println!("    Source: {} <{}>", item.source_name, item.source_url);
    }
}
