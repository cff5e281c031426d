mod config;
mod db;
mod error;
mod extract;
mod pipeline;
mod transform;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::Settings;
use crate::extract::ApodClient;
use crate::pipeline::{PipelineRun, StageGraph};

#[derive(Parser)]
#[command(name = "apod_etl", about = "Daily NASA APOD extract-transform-load run")]
struct Cli {
    /// Config file (default: config/apod.* if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the apod_data table if it does not exist
    Init,
    /// Fetch today's record and store it (one run)
    Run,
    /// Print the stage graph and schedule as JSON for an external scheduler
    Stages,
    /// Show the most recently stored records
    List {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
    /// Show table statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    let result = match cli.command {
        Commands::Init => {
            let conn = db::connect(&settings.database.path)?;
            db::ensure_schema(&conn)?;
            println!("Table apod_data ready in {}", settings.database.path.display());
            Ok(())
        }
        Commands::Run => {
            let (client, conn) = prepare_run(&settings)?;
            let mut run = PipelineRun::new();
            info!("Starting {} against {}", run.run_id(), settings.api.url());

            let result = run.execute(&conn, &client).await;
            let trail: Vec<String> = run.history().iter().map(|s| s.to_string()).collect();
            info!("{} ended {} ({})", run.run_id(), run.state(), trail.join(" -> "));

            let outcome = result.with_context(|| format!("{} failed", run.run_id()))?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Commands::Stages => {
            let graph = StageGraph::new(&settings.schedule)?;
            println!("{}", serde_json::to_string_pretty(&graph)?);
            Ok(())
        }
        Commands::List { limit } => {
            let conn = db::connect(&settings.database.path)?;
            db::ensure_schema(&conn)?;
            let rows = db::fetch_recent(&conn, limit)?;
            if rows.is_empty() {
                println!("No records. Run 'run' first.");
                return Ok(());
            }

            println!(
                "{:>5} | {:<10} | {:<8} | {:<40} | {:<40}",
                "id", "Date", "Media", "Title", "URL"
            );
            println!("{}", "-".repeat(115));
            for r in &rows {
                let f = &r.fields;
                println!(
                    "{:>5} | {:<10} | {:<8} | {:<40} | {:<40}",
                    r.id,
                    f.date,
                    truncate(&f.media_type, 8),
                    truncate(&f.title, 40),
                    truncate(&f.url, 40)
                );
            }
            println!("\n{} records", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.database.path)?;
            db::ensure_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Records:         {}", s.total);
            println!("Distinct dates:  {}", s.distinct_dates);
            println!("Duplicate dates: {}", s.duplicate_dates);
            println!("Latest date:     {}", s.latest_date.as_deref().unwrap_or("-"));
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Client first, so a bad key or URL fails before the database file is created.
fn prepare_run(settings: &Settings) -> Result<(ApodClient, rusqlite::Connection), error::Error> {
    let client = ApodClient::new(&settings.api)?;
    let conn = db::connect(&settings.database.path)?;
    Ok((client, conn))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
