use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use exam_results::config::DbConfig;
use exam_results::db::{self, PgStore};
use exam_results::engine;

#[derive(Parser)]
#[command(name = "exam-results")]
#[command(about = "Grade exam marks and compute semester SGPA per scheme", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo scheme with subjects and marks
    Seed,
    /// Recalculate grades and semester results for a scheme
    Calculate {
        #[arg(long)]
        scheme_id: i64,
    },
    /// List semester results for a scheme
    Results {
        #[arg(long)]
        scheme_id: i64,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = DbConfig::from_env()?;
    let pool = db::connect(&config)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let scheme_id = db::seed(&pool).await?;
            println!("Seed data inserted for scheme {scheme_id}.");
        }
        Commands::Calculate { scheme_id } => {
            let store = PgStore::new(pool);
            let outcome = engine::recalculate(&store, scheme_id).await;
            if !outcome.success {
                anyhow::bail!(outcome.message);
            }
            println!("{}", outcome.message);
        }
        Commands::Results { scheme_id, limit } => {
            let results = db::fetch_results(&pool, scheme_id).await?;

            if results.is_empty() {
                println!("No results recorded for scheme {scheme_id}.");
                return Ok(());
            }

            println!("Semester results for scheme {scheme_id}:");
            for result in results.iter().take(limit) {
                println!(
                    "- {} sgpa {:.2} ({} of {} credits earned, attempt {})",
                    result.student_id,
                    result.sgpa,
                    result.total_credits_earned,
                    result.total_credits_registered,
                    result.attempt_no
                );
            }
        }
    }

    Ok(())
}
