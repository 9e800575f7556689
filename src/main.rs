use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;

use bis_debt_securities::{
    aggregate_by_year_sector, db, get_all_observations, insert_observations, parquet,
    pull_debt_securities, setup_database, verify_count, write_chart_csv, write_chart_json,
    Event, PipelineConfig, QualityEngine, SdmxClient, TARGET_COUNTRIES,
};

#[derive(Parser)]
#[command(name = "bis-dss", version, about = "BIS Debt Securities Statistics pipeline")]
struct Cli {
    /// Directory for the SQLite store and the cleaned parquet artifact
    #[arg(long, env = "BIS_DATA_DIR", default_value = "_data", global = true)]
    data_dir: PathBuf,

    /// Directory for chart-data artifacts
    #[arg(long, env = "BIS_OUTPUT_DIR", default_value = "_output", global = true)]
    output_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pull BIS observations into the SQLite store
    Pull(PullArgs),
    /// Clean stored observations and write the parquet artifact
    Clean,
    /// Aggregate the cleaned artifact into year x sector chart data
    Aggregate,
    /// Pull, clean and aggregate in one go
    Run(PullArgs),
    /// Report store contents per dataflow and reference area
    Status,
}

#[derive(Args)]
struct PullArgs {
    #[arg(long, env = "BIS_START_PERIOD", default_value = "2003")]
    start_period: String,

    #[arg(long, env = "BIS_END_PERIOD", default_value = "2020")]
    end_period: String,

    /// Country to pull (repeatable); defaults to the built-in roster
    #[arg(long = "country")]
    countries: Vec<String>,

    /// Reference areas per data request (0 = single request)
    #[arg(long, env = "BIS_REF_AREA_BATCH_SIZE", default_value_t = 3)]
    batch_size: usize,

    #[arg(long, env = "BIS_MAX_RETRIES", default_value_t = 5)]
    max_retries: usize,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let base_config = PipelineConfig {
        data_dir: cli.data_dir.clone(),
        output_dir: cli.output_dir.clone(),
        ..PipelineConfig::default()
    };

    match cli.command {
        Command::Pull(args) => {
            let config = apply_pull_args(base_config, &args);
            run_pull(&config, &args)?;
        }
        Command::Clean => {
            run_clean(&base_config)?;
        }
        Command::Aggregate => {
            run_aggregate(&base_config)?;
        }
        Command::Run(args) => {
            let config = apply_pull_args(base_config, &args);
            run_pull(&config, &args)?;
            run_clean(&config)?;
            run_aggregate(&config)?;
        }
        Command::Status => {
            run_status(&base_config)?;
        }
    }

    Ok(())
}

fn apply_pull_args(mut config: PipelineConfig, args: &PullArgs) -> PipelineConfig {
    config.start_period = args.start_period.clone();
    config.end_period = args.end_period.clone();
    config.ref_area_batch_size = args.batch_size;
    config.max_retries = args.max_retries;
    config
}

fn run_pull(config: &PipelineConfig, args: &PullArgs) -> Result<()> {
    println!("⬇️  Pulling BIS debt securities ({} - {})", config.start_period, config.end_period);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let countries: Vec<String> = if args.countries.is_empty() {
        TARGET_COUNTRIES.iter().map(|s| s.to_string()).collect()
    } else {
        args.countries.clone()
    };

    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;

    let client = SdmxClient::new(config)?;
    let run = pull_debt_securities(&client, config, &countries)?;
    println!("✓ Fetched {} observations", run.observations.len());

    let conn = Connection::open(config.db_path())?;
    setup_database(&conn)?;

    let outcome = insert_observations(&conn, &run.observations)?;
    println!("✓ Inserted: {} observations", outcome.inserted);
    println!("✓ Skipped duplicates: {}", outcome.duplicates);

    let event = Event::new(
        "pull_completed",
        "pull_run",
        &run.run_id,
        serde_json::json!({
            "countries": countries,
            "start_period": config.start_period,
            "end_period": config.end_period,
            "fetched": run.observations.len(),
            "inserted": outcome.inserted,
            "duplicates": outcome.duplicates,
        }),
        "bis-dss",
    );
    db::insert_event(&conn, &event)?;

    println!("✓ Store contains {} observations", verify_count(&conn)?);
    Ok(())
}

fn run_clean(config: &PipelineConfig) -> Result<()> {
    println!("\n🧹 Cleaning observations");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = Connection::open(config.db_path())
        .with_context(|| format!("No store at {} (run pull first)", config.db_path().display()))?;
    setup_database(&conn)?;

    let observations = get_all_observations(&conn)?;
    let engine = QualityEngine::new();
    let (cleaned, summary) = engine.clean(observations);
    println!("✓ {}", summary.summary());

    let path = config.cleaned_parquet_path();
    parquet::write_cleaned(&path, &cleaned)?;
    println!("✓ Wrote {}", path.display());

    let event = Event::new(
        "clean_completed",
        "clean_run",
        &uuid::Uuid::new_v4().to_string(),
        serde_json::to_value(&summary)?,
        "bis-dss",
    );
    db::insert_event(&conn, &event)?;

    Ok(())
}

fn run_status(config: &PipelineConfig) -> Result<()> {
    println!("🗄️  Observation store status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = Connection::open(config.db_path())
        .with_context(|| format!("No store at {} (run pull first)", config.db_path().display()))?;
    setup_database(&conn)?;

    println!("✓ {} observations total", verify_count(&conn)?);
    for stat in db::get_dataflow_stats(&conn)? {
        println!(
            "  {} {}: {} observations, {} - {}",
            stat.dataflow,
            stat.ref_area,
            stat.observation_count,
            stat.first_period,
            stat.last_period
        );
    }

    Ok(())
}

fn run_aggregate(config: &PipelineConfig) -> Result<()> {
    println!("\n📊 Aggregating average OBS_VALUE by year and sector");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let cleaned = parquet::read_cleaned(&config.cleaned_parquet_path())
        .context("No cleaned artifact (run clean first)")?;
    let rows = aggregate_by_year_sector(&cleaned);
    println!("✓ {} (year, sector) groups", rows.len());

    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;

    let stem = config.chart_data_stem();
    let csv_path = stem.with_extension("csv");
    let json_path = stem.with_extension("json");
    write_chart_csv(&csv_path, &rows)?;
    write_chart_json(&json_path, &rows)?;

    println!("✓ Wrote {}", csv_path.display());
    println!("✓ Wrote {}", json_path.display());
    Ok(())
}
