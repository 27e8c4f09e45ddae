//! On-demand batch runner for the stock ledger.
//!
//! Connects to Postgres via `DATABASE_URL` and prints results as JSON.

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use stockledger_core::{Actor, ProductId};
use stockledger_infra::{LedgerConfig, LedgerEngine, PostgresLedgerStore};

#[derive(Parser)]
#[command(name = "stockledger", about = "Stock ledger batch operations", version)]
struct Cli {
    #[arg(long, global = true, env = "DATABASE_URL", help = "Postgres connection URL")]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations.
    Migrate,
    /// Print the current low-stock alerts.
    Alerts,
    /// Turn the current alerts into shipping instructions and inbound plans.
    Replenish {
        #[arg(long, help = "Business date (YYYY-MM-DD), defaults to today in UTC")]
        date: Option<NaiveDate>,
        #[arg(long, help = "Administrator id recorded on created documents")]
        actor: String,
    },
    /// Compare stored balances with a replay of the history.
    Reconcile,
    /// Print per-state totals for one product.
    Stock {
        #[arg(long)]
        product: ProductId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    stockledger_observability::init();
    let cli = Cli::parse();

    let mut config = LedgerConfig::from_env();
    if let Some(url) = cli.database_url {
        config = config.with_database_url(url);
    }
    let store = PostgresLedgerStore::connect(&config)
        .await
        .context("failed to connect to postgres")?;

    if let Commands::Migrate = cli.command {
        store.migrate().await.context("migration failed")?;
        info!("migrations applied");
        return Ok(());
    }

    let engine = LedgerEngine::new(store, config);
    match cli.command {
        Commands::Migrate => {}
        Commands::Alerts => print_json(&engine.low_stock_alerts().await?)?,
        Commands::Replenish { date, actor } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let report = engine.auto_replenish(date, &Actor::admin(actor)).await?;
            print_json(&report)?;
        }
        Commands::Reconcile => {
            let drifts = engine.reconcile().await?;
            print_json(&drifts)?;
            if !drifts.is_empty() {
                bail!("{} balance(s) diverge from history", drifts.len());
            }
        }
        Commands::Stock { product } => print_json(&engine.product_stock(product).await?)?,
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
