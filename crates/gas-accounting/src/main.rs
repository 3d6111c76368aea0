//! CLI entry point for the gas accounting engine

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use gas_accounting::cache::SyncCache;
use gas_accounting::config::{Config, FileConfig};
use gas_accounting::constants::LAMPORTS_PER_SOL;
use gas_accounting::sync::{GasEngine, MonthView};

#[derive(Parser)]
#[command(name = "gas-accounting")]
#[command(about = "Per-day Solana gas fee accounting for a wallet address")]
struct Cli {
    /// Path to config.toml
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the RPC URL from the config file
    #[arg(long)]
    rpc_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sync and display one month of daily fee totals
    Month {
        /// Wallet address (base58)
        address: String,
        /// Month to report, as YYYY-MM
        month: String,
        /// Also write the daily rows to a CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Force one day back through the full pipeline, ignoring the cache
    Recompute {
        /// Wallet address (base58)
        address: String,
        /// Day to recompute, as YYYY-MM-DD
        date: NaiveDate,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_config = FileConfig::load(&cli.config)?;
    let config = Config::from_file(&file_config, cli.rpc_url)?;

    let cache = SyncCache::open(&config.cache_path)
        .await
        .with_context(|| format!("Failed to open cache at {}", config.cache_path.display()))?;
    let engine = GasEngine::new(&config, cache)?;

    match cli.command {
        Command::Month {
            address,
            month,
            csv,
        } => {
            let view = engine.month_view(&address, &month).await?;
            print_month_view(&view, &config.local_currency);
            if let Some(path) = csv {
                write_month_csv(&view, &path)?;
                println!("\nWrote {}", path.display());
            }
        }
        Command::Recompute { address, date } => {
            let day = engine.recompute_day(&address, date).await?;
            println!(
                "{}: {} tx, {:.9} SOL, ${:.4}, {:.4} {} ({}{})",
                day.date,
                day.tx_count,
                day.fee_lamports as f64 / LAMPORTS_PER_SOL as f64,
                day.fee_usd,
                day.fee_local,
                config.local_currency,
                if day.synced { "synced" } else { "partial" },
                if day.estimated { ", estimated prices" } else { "" }
            );
        }
    }

    Ok(())
}

/// Console table: active days only, with a totals footer.
fn print_month_view(view: &MonthView, local_currency: &str) {
    println!("\nGas fees for {}", view.address);
    println!(
        "{:<12} {:>6} {:>14} {:>12} {:>12}",
        "Date", "Txs", "Fee (SOL)", "Fee (USD)", local_currency
    );
    println!("{}", "-".repeat(60));

    for day in &view.days {
        if day.tx_count == 0 && day.synced {
            continue;
        }
        let marker = if !day.synced {
            "*"
        } else if day.estimated {
            "~"
        } else {
            " "
        };
        println!(
            "{:<12}{} {:>5} {:>14.9} {:>12.4} {:>12.4}",
            day.date.to_string(),
            marker,
            day.tx_count,
            day.fee_lamports as f64 / LAMPORTS_PER_SOL as f64,
            day.fee_usd,
            day.fee_local
        );
    }

    let totals = view.totals();
    println!("{}", "-".repeat(60));
    println!(
        "{:<12} {:>6} {:>14.9} {:>12.4} {:>12.4}",
        format!("{} days", totals.active_days),
        totals.tx_count,
        totals.fee_lamports as f64 / LAMPORTS_PER_SOL as f64,
        totals.fee_usd,
        totals.fee_local
    );

    if totals.estimated_days > 0 {
        println!(
            "~ {} day(s) priced with a fallback rate; values are estimates",
            totals.estimated_days
        );
    }
    if totals.unsynced_days > 0 {
        eprintln!(
            "\n* {} day(s) could not be fully synced; re-run to retry them",
            totals.unsynced_days
        );
    }
    if view.truncated {
        eprintln!("Scan cap hit: older days of this month may be incomplete");
    }
}

/// One row per calendar day, including quiet days.
fn write_month_csv(view: &MonthView, path: &PathBuf) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;

    writer.write_record([
        "Date",
        "Tx_Count",
        "Synced",
        "Estimated",
        "Fee_SOL",
        "Fee_USD",
        "Fee_Local",
    ])?;

    for day in &view.days {
        writer.write_record([
            day.date.to_string(),
            day.tx_count.to_string(),
            day.synced.to_string(),
            day.estimated.to_string(),
            format!("{:.9}", day.fee_lamports as f64 / LAMPORTS_PER_SOL as f64),
            format!("{:.4}", day.fee_usd),
            format!("{:.4}", day.fee_local),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
