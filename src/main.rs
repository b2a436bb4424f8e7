use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::Instrument;

mod alerts;
mod config;
mod db;
mod error;
mod evaluator;
mod health;
mod ingest;
mod models;
mod report;
mod staking;
mod telemetry;

use config::EvaluatorConfig;
use error::ConfigError;
use ingest::RawStakingRecord;
use models::{Importance, Snapshot};

#[derive(Parser)]
#[command(name = "staking-health")]
#[command(about = "Staking health scoring and alerting for Mission Control", long_about = None)]
struct Cli {
    /// TOML file overriding evaluator thresholds and weights
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Upsert one day of staking metrics
    Ingest {
        /// Calendar date, YYYY-MM-DD
        #[arg(long)]
        date: String,
        #[arg(long)]
        starts: u32,
        #[arg(long)]
        completions: u32,
        /// Fraction (0-1) or percentage (0-100); derived from the counts when omitted
        #[arg(long)]
        completion_rate: Option<f64>,
        #[arg(long, default_value = "mixpanel")]
        source: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Upsert staking metrics from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Append an entry to the memory log
    Remember {
        #[arg(long)]
        content: String,
        #[arg(long, default_value = "conversation")]
        kind: String,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long, value_parser = parse_importance)]
        importance: Option<Importance>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Score staking health and list alerts
    Evaluate {
        /// Snapshot JSON file ("-" for stdin) instead of the database
        #[arg(long)]
        input: Option<PathBuf>,
        /// Days of staking history to load from the database
        #[arg(long, default_value_t = db::DEFAULT_STAKING_LIMIT, value_parser = clap::value_parser!(i64).range(1..))]
        limit: i64,
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = db::DEFAULT_STAKING_LIMIT, value_parser = clap::value_parser!(i64).range(1..))]
        limit: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::InitDb => "init-db",
            Self::Seed => "seed",
            Self::Ingest { .. } => "ingest",
            Self::Import { .. } => "import",
            Self::Remember { .. } => "remember",
            Self::Evaluate { .. } => "evaluate",
            Self::Report { .. } => "report",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Text,
}

fn parse_importance(value: &str) -> Result<Importance, String> {
    Importance::parse(value)
        .ok_or_else(|| format!("expected one of low, medium, high, critical; got {value:?}"))
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_snapshot(input: Option<&Path>, limit: i64) -> anyhow::Result<Snapshot> {
    match input {
        Some(path) if path == Path::new("-") => ingest::read_snapshot(std::io::stdin().lock()),
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            ingest::read_snapshot(BufReader::new(file))
                .with_context(|| format!("reading snapshot {}", path.display()))
        }
        None => {
            let pool = connect().await?;
            db::load_snapshot(&pool, limit, db::DEFAULT_MEMORY_LIMIT).await
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => EvaluatorConfig::load(path)?,
        None => EvaluatorConfig::default(),
    };

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Ingest {
            date,
            starts,
            completions,
            completion_rate,
            source,
            notes,
        } => {
            let record = RawStakingRecord {
                date,
                starts,
                completions,
                completion_rate,
                source: Some(source),
                notes,
                created_at: None,
            };
            // Reject what the evaluator would later drop.
            let parsed = record.clone().into_record()?;
            let pool = connect().await?;
            let id = db::upsert_staking(&pool, &record).await?;
            println!("Stored {} ({:.1}%) as {id}.", parsed.date, parsed.rate);
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let upserted = db::import_csv(&pool, &csv).await?;
            println!("Upserted {upserted} days from {}.", csv.display());
        }
        Commands::Remember {
            content,
            kind,
            agent,
            importance,
            tags,
        } => {
            let pool = connect().await?;
            let id = db::add_memory(
                &pool,
                &db::NewMemory {
                    kind,
                    content,
                    agent,
                    importance,
                    tags,
                },
            )
            .await?;
            println!("Memory stored as {id}.");
        }
        Commands::Evaluate {
            input,
            limit,
            format,
        } => {
            let snapshot = load_snapshot(input.as_deref(), limit).await?;
            let health = evaluator::evaluate(&snapshot, &config, Utc::now());

            match format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&health)?),
                Format::Text => print!("{}", report::render_text(&health)),
            }
        }
        Commands::Report { input, limit, out } => {
            let snapshot = load_snapshot(input.as_deref(), limit).await?;
            let now = Utc::now();
            let health = evaluator::evaluate(&snapshot, &config, now);
            let markdown = report::build_report(&snapshot, &health, &config, now);
            std::fs::write(&out, markdown)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init();

    let cli = Cli::parse();
    let span = tracing::info_span!("command", name = cli.command.name());

    match run(cli).instrument(span).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(config_err) = e.downcast_ref::<ConfigError>() {
                eprintln!("error: {config_err}");
                config_err.exit_code()
            } else {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        }
    }
}
