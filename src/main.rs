use afl_insight::config::InsightConfig;
use afl_insight::entities::{EntityNormalizer, RawEntities};
use afl_insight::safety::SqlSafetyGate;
use afl_insight::stats::{AnalysisKind, Dataset, StatParams, StatisticsEngine};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "afl-insight")]
#[command(about = "SQL safety gate, team name resolution and match statistics for AFL queries")]
#[command(version)]
struct Args {
    /// JSON configuration file (defaults apply for missing fields)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a SQL string is a read-only query over allowed tables
    ValidateSql {
        sql: String,
    },
    /// Resolve team mentions to canonical club names
    ResolveTeam {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Validate extracted entities given as a JSON object
    ValidateEntities {
        json: String,
    },
    /// Run statistical analyses over a CSV or JSON result set
    Analyze {
        /// Result rows as .csv (with header) or .json (array of objects)
        #[arg(short, long)]
        data: PathBuf,

        /// Analysis kinds: average, trend, comparison, rank
        #[arg(short, long = "kind", required = true)]
        kinds: Vec<String>,

        #[arg(long)]
        metric: Option<String>,

        #[arg(long)]
        group_by: Option<String>,

        /// Rank lower values first
        #[arg(long)]
        ascending: bool,

        /// Momentum window for trend analysis
        #[arg(long)]
        window: Option<usize>,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Commands::ValidateSql { sql } => validate_sql(&config, &sql),
        Commands::ResolveTeam { names } => resolve_teams(&config, &names),
        Commands::ValidateEntities { json } => validate_entities(&config, &json),
        Commands::Analyze {
            data,
            kinds,
            metric,
            group_by,
            ascending,
            window,
        } => {
            let params = StatParams {
                metric,
                group_by,
                ascending,
                window,
            };
            analyze(&config, &data, &kinds, &params)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<InsightConfig> {
    let config = match path {
        Some(path) => InsightConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => InsightConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

fn validate_sql(config: &InsightConfig, sql: &str) -> Result<()> {
    let gate = SqlSafetyGate::new(&config.sql_gate);
    debug!(
        "Allowed tables: {}",
        gate.allowed_tables().collect::<Vec<_>>().join(", ")
    );
    let outcome = gate.validate(sql);
    let message = outcome.message();
    let output = serde_json::json!({
        "accepted": outcome.accepted,
        "reason": &outcome.reason,
        "message": message,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    if outcome.into_result().is_err() {
        std::process::exit(2);
    }
    Ok(())
}

fn resolve_teams(config: &InsightConfig, names: &[String]) -> Result<()> {
    let normalizer = EntityNormalizer::afl(config.entities.clone());
    for name in names {
        match normalizer.resolve(name) {
            Ok(m) => println!("{}\t{}\t{:.3}", name, m.canonical, m.score),
            Err(_) => {
                let hints = normalizer.suggest_teams(name, config.entities.suggestion_count);
                if hints.is_empty() {
                    println!("{}\tunresolved", name);
                } else {
                    println!("{}\tunresolved\t(try: {})", name, hints.join(", "));
                }
            }
        }
    }
    Ok(())
}

fn validate_entities(config: &InsightConfig, json: &str) -> Result<()> {
    let raw: RawEntities = serde_json::from_str(json).context("Entities must be a JSON object")?;
    let normalizer = EntityNormalizer::afl(config.entities.clone());
    let validation = normalizer.validate_entities(&raw);
    println!("{}", serde_json::to_string_pretty(&validation)?);
    Ok(())
}

fn analyze(config: &InsightConfig, data: &Path, kinds: &[String], params: &StatParams) -> Result<()> {
    let kinds = kinds
        .iter()
        .map(|k| k.parse::<AnalysisKind>())
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let dataset = load_dataset(data)?;
    info!(
        "Loaded {} rows, {} columns from {}",
        dataset.row_count(),
        dataset.columns().len(),
        data.display()
    );

    let engine = StatisticsEngine::new(config.stats.clone());
    let combined = engine.compute_many(&dataset, &kinds, params);
    println!("{}", serde_json::to_string_pretty(&combined)?);
    Ok(())
}

fn load_dataset(path: &Path) -> Result<Dataset> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    let dataset = match extension.as_deref() {
        Some("csv") => {
            let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
            Dataset::from_csv_reader(file)?
        }
        Some("json") => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read {}", path.display()))?;
            let rows: serde_json::Value = serde_json::from_str(&content)?;
            Dataset::from_json_rows(&rows)?
        }
        _ => anyhow::bail!("Unsupported data file {} (expected .csv or .json)", path.display()),
    };
    Ok(dataset)
}
