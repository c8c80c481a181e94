use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use remit::commands::{associate_manually, list_unpaid, update};
use remit::Settings;
use remit_import::JsonOrderSource;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "remit")]
#[command(about = "Match bank transfers to storefront orders")]
struct Cli {
    /// TOML settings file (also read from `REMIT_CONFIG`).
    #[arg(long, env = "REMIT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import orders and transactions, then match them.
    Update,
    /// Allocate transactions by id.
    Associate,
    /// List orders that are not paid in full.
    Unpaid,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    if let Some(parent) = settings.database_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create data directory")?;
    }
    let pool = remit_storage::create_db(&settings.database_path)
        .await
        .with_context(|| format!("Failed to open {}", settings.database_path.display()))?;

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();

    match cli.command {
        Command::Update => {
            let mut source = if settings.orders_file.exists() {
                JsonOrderSource::from_path(&settings.orders_file, settings.order_page_size)
                    .context("Failed to read order export")?
            } else {
                println!(
                    "No order export at {}, only transactions are imported.",
                    settings.orders_file.display()
                );
                JsonOrderSource::new(Vec::new(), settings.order_page_size)
            };
            let today = chrono::Local::now().date_naive();
            update(&pool, &settings, &mut source, stdin.lock(), stdout.lock(), today).await?;
        }
        Command::Associate => {
            let policy = settings.write_off_policy();
            let summary =
                associate_manually(&pool, &policy, stdin.lock(), stdout.lock()).await?;
            tracing::info!(?summary, "manual association finished");
        }
        Command::Unpaid => {
            list_unpaid(&pool, stdout.lock()).await?;
        }
    }

    pool.close().await;
    Ok(())
}
