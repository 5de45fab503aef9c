use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

mod config;
mod db;
mod error;
mod loader;
mod models;
mod queries;
mod report;

use models::{LoadOutcome, Severity};
use queries::CollisionFilter;

#[derive(Parser)]
#[command(name = "uk-collision-analytics")]
#[command(about = "Loads UK road-collision CSVs into Postgres and answers dashboard queries", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the warehouse table and indexes
    InitDb,
    /// Load yearly collision CSV files into the warehouse
    Load {
        /// Directory holding one CSV per year
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
        /// Rows per insert transaction
        #[arg(long, default_value_t = loader::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Print collision count and casualty/vehicle averages
    Summary {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, value_enum)]
        severity: Option<Severity>,
    },
    /// Print collision counts per calendar month
    Trend {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, value_enum)]
        severity: Option<Severity>,
    },
    /// Print the most common road types
    Roads {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, value_enum)]
        severity: Option<Severity>,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Print a random sample of collision coordinates
    Points {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, value_enum)]
        severity: Option<Severity>,
        #[arg(long, default_value_t = 5000)]
        max_points: i64,
    },
    /// Write a markdown summary covering all dashboard panels
    Report {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, value_enum)]
        severity: Option<Severity>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let url = config::database_url();
    let pool = db::connect(&url).await?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Load {
            data_dir,
            batch_size,
        } => {
            db::init_db(&pool).await?;
            let files = loader::collision_files(&data_dir)
                .with_context(|| format!("failed to list {}", data_dir.display()))?;
            if files.is_empty() {
                println!("No CSV files found under {}.", data_dir.display());
                return Ok(());
            }

            match loader::load_files(&pool, &files, batch_size).await? {
                LoadOutcome::AlreadyLoaded => {
                    println!("Warehouse already contains collision rows; load skipped.");
                }
                LoadOutcome::LoadInProgress => {
                    println!("Another load is in progress; nothing to do.");
                }
                LoadOutcome::Completed(summary) => {
                    for report in &summary.reports {
                        println!(
                            "{}: {} rows loaded, {} skipped, {} duplicates",
                            report.path.display(),
                            report.rows_loaded,
                            report.rows_skipped,
                            report.rows_deduped
                        );
                    }
                    println!(
                        "Load complete: {} files attempted, {} missing or unreadable.",
                        summary.files_attempted, summary.files_missing
                    );
                    println!(
                        "Rows: {} loaded, {} skipped as malformed, {} duplicates dropped.",
                        summary.rows_loaded(),
                        summary.rows_skipped(),
                        summary.rows_deduped()
                    );
                }
            }
        }
        Commands::Summary { year, severity } => {
            let filter = CollisionFilter { year, severity };
            let total = queries::total_count(&pool, &filter).await?;
            let avg_casualties = queries::average_casualties(&pool, &filter).await?;
            let avg_vehicles = queries::average_vehicles(&pool, &filter).await?;

            println!("Collisions ({}):", report::filter_label(&filter));
            println!("- total: {total}");
            println!("- average casualties: {avg_casualties:.2}");
            println!("- average vehicles: {avg_vehicles:.2}");
        }
        Commands::Trend { year, severity } => {
            let filter = CollisionFilter { year, severity };
            let trend = queries::monthly_trend(&pool, &filter).await?;
            if trend.is_empty() {
                println!("No collisions match this filter.");
                return Ok(());
            }
            for entry in trend {
                println!("{}: {}", entry.month.format("%Y-%m"), entry.count);
            }
        }
        Commands::Roads {
            year,
            severity,
            limit,
        } => {
            let filter = CollisionFilter { year, severity };
            let roads = queries::top_road_types(&pool, &filter, limit).await?;
            if roads.is_empty() {
                println!("No collisions match this filter.");
                return Ok(());
            }
            for entry in roads {
                println!("{}: {}", entry.road_type, entry.count);
            }
        }
        Commands::Points {
            year,
            severity,
            max_points,
        } => {
            let filter = CollisionFilter { year, severity };
            let points = queries::sampled_locations(&pool, &filter, max_points).await?;
            if points.is_empty() {
                println!("No geotagged collisions match this filter.");
                return Ok(());
            }
            for point in points {
                println!(
                    "{:.6},{:.6},{}",
                    point.latitude, point.longitude, point.severity
                );
            }
        }
        Commands::Report {
            year,
            severity,
            out,
        } => {
            let filter = CollisionFilter { year, severity };
            let view = queries::aggregate_view(&pool, &filter, 10, 5000).await?;
            let report = report::build_report(&filter, &view);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
