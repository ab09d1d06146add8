use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

use detseed::config::{ExistingDataPolicy, LoadMode, SeedConfig, DEFAULT_BATCH_SIZE};
use detseed::logging;
use detseed::pipeline::{self, RunSummary};

#[derive(Parser)]
#[command(name = "detseed")]
#[command(about = "Loads detection CSV exports into SQLite or PostgreSQL")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a CSV export and load it into the target store
    Seed {
        /// Path to the source CSV file
        #[arg(long)]
        source: PathBuf,
        /// Target connection: a SQLite file path or a postgres:// URL
        #[arg(long, env = "DATABASE_URL")]
        target: String,
        /// Rows per insert transaction
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// replace drops and recreates the table; append inserts only
        #[arg(long, value_enum, default_value = "replace")]
        mode: LoadMode,
        /// Policy when an append-mode target already has rows; replace mode
        /// always drops and reloads the table
        #[arg(long, value_enum, default_value = "fail")]
        if_exists: ExistingDataPolicy,
        /// Also print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    match cli.command {
        Commands::Seed {
            source,
            target,
            batch_size,
            mode,
            if_exists,
            json,
        } => {
            let config = SeedConfig {
                source,
                target,
                batch_size,
                mode,
                if_exists,
            };

            let cancel = Arc::new(AtomicBool::new(false));
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("Cancellation requested; in-flight batches will finish");
                        cancel.store(true, Ordering::Relaxed);
                    }
                });
            }

            println!("🔄 Seeding detections from {}...", config.source.display());
            match pipeline::run(&config, cancel).await {
                Ok(summary) => {
                    print_summary(&summary);
                    if json {
                        match serde_json::to_string_pretty(&summary) {
                            Ok(rendered) => println!("{rendered}"),
                            Err(e) => warn!("Could not render JSON summary: {e}"),
                        }
                    }
                    if summary.succeeded() {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    }
                }
                Err(e) => {
                    error!("Seeding failed: {e}");
                    eprintln!("❌ Seeding failed: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 Run {} ({} backend):", summary.run_id, summary.backend);
    println!("   Rows read: {}", summary.rows_read);
    println!(
        "   Rows rejected: {} (invalid coordinates: {}, invalid timestamp: {})",
        summary.rejections.total(),
        summary.rejections.invalid_coordinates,
        summary.rejections.invalid_timestamp
    );
    println!(
        "   Rows loaded: {} in {} batches",
        summary.rows_loaded, summary.batches_committed
    );
    if summary.duplicates_skipped > 0 {
        println!("   Duplicates skipped: {}", summary.duplicates_skipped);
    }

    if let Some(stats) = &summary.verification {
        println!("   Verified total rows: {}", stats.total_rows);
        println!("   Distinct classes: {}", stats.distinct_classes);
        if let (Some(min_t), Some(max_t)) = (stats.min_t, stats.max_t) {
            println!("   Time range: {min_t} to {max_t}");
        }
        if !stats.rows_per_class.is_empty() {
            println!("   Rows per class:");
            for (class, count) in &stats.rows_per_class {
                println!("     {class}: {count}");
            }
        }
    }

    if let Some(failure) = &summary.failure {
        println!(
            "\n⚠️  Load stopped at rows {}..={} after {} attempt(s): {}",
            failure.first_row, failure.last_row, failure.attempts, failure.message
        );
        println!("   Batches committed before the failure remain persisted.");
    } else if summary.cancelled {
        println!("\n⚠️  Run cancelled; committed batches remain persisted.");
    } else {
        println!("\n✅ Seeding completed successfully");
    }
}
