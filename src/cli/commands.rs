//! CLI command implementations

use anyhow::Result;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{info, warn};

use crate::app::{App, AppStatus};
use crate::config::{mask_address, Config};
use crate::distribution::{LegKind, OPERATIONAL_BUCKET};
use crate::services::{JsonlLedger, LedgerEntry};

/// Run the withdrawal monitor and the distribution scheduler until Ctrl-C
pub async fn run(config: &Config) -> Result<()> {
    info!("Starting profit router...");

    let w = &config.withdrawal;
    if w.enabled {
        info!(
            "Withdrawal: ${} within {}h, polling every {}s, to {} on {}",
            w.threshold_usd,
            w.deadline_secs / 3600,
            w.poll_interval_secs,
            mask_address(&w.address),
            w.network
        );
    }
    if config.distribution.enabled {
        info!(
            "Distribution: every {}s across {} destinations",
            config.distribution.period_secs,
            config.distribution.destinations.len()
        );
    }
    if config.stablecoin.enabled {
        info!(
            "Stablecoin sweep: every {}s, up to ${} {}",
            config.stablecoin.period_secs, config.stablecoin.ceiling_usd, config.stablecoin.asset
        );
    }
    if config.notifications.telegram().is_none() {
        warn!("TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID not set, notifications will only be logged");
    }

    let app = App::simulated(config.clone());
    app.start()?;
    if let Some(next) = app.scheduler().next_distribution_at() {
        info!("First distribution at {}", next.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    let mut status_interval = tokio::time::interval(Duration::from_secs(w.poll_interval_secs.max(1)));
    status_interval.tick().await;

    loop {
        tokio::select! {
            _ = status_interval.tick() => {
                let status = app.status();
                if let Some(window) = &status.withdrawal.window {
                    info!(
                        "Window {}: ${} / ${} ({}%), {}s remaining",
                        window.status,
                        window.last_profit_usd.unwrap_or_default(),
                        window.threshold_usd,
                        window.progress_pct,
                        window.remaining_secs
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    app.shutdown().await;
    print_status(&app.status());
    Ok(())
}

/// Show how an amount would be split, without moving anything
pub async fn plan(config: &Config, amount: Decimal) -> Result<()> {
    let app = App::simulated(config.clone());
    let (plan, legs) = app.scheduler().preview(amount)?;

    println!("\n=== DISTRIBUTION PLAN (${}) ===\n", plan.total_usd);
    println!("{:<12} {:<8} {:<16} {:<14}", "DESTINATION", "SHARE", "TARGET", "USD");
    println!("{}", "-".repeat(52));

    for allocation in &plan.allocations {
        println!(
            "{:<12} {:<8} {:<16} {:<14}",
            allocation.destination_id,
            format!("{}%", allocation.percentage),
            "",
            allocation.amount_usd
        );
        for leg in legs.iter().filter(|l| l.destination_id == allocation.destination_id) {
            let target = match leg.kind {
                LegKind::Transfer => leg.target.clone(),
                LegKind::Reinvestment => format!("~{}", leg.target),
            };
            println!("{:<12} {:<8} {:<16} {:<14}", "", "", target, leg.amount_usd);
        }
    }

    println!("{}", "-".repeat(52));
    println!(
        "{:<12} {:<8} {:<16} {:<14}",
        OPERATIONAL_BUCKET,
        format!("{}%", plan.unallocated_pct),
        "",
        plan.unallocated_usd
    );
    println!();

    Ok(())
}

/// Distribute an amount now
pub async fn distribute(config: &Config, amount: Decimal) -> Result<()> {
    let app = App::simulated(config.clone());
    let run = app.scheduler().distribute_manual(amount).await?;

    println!("\n=== DISTRIBUTION {} ===\n", run.outcome.to_string().to_uppercase());
    println!("{:<12} {:<16} {:<14} {:<18} {:<10}", "DESTINATION", "TARGET", "USD", "AMOUNT", "STATUS");
    println!("{}", "-".repeat(74));

    for leg in &run.legs {
        let amount = match (&leg.amount_asset, &leg.asset) {
            (Some(units), Some(asset)) => format!("{} {}", units, asset),
            _ => "-".to_string(),
        };
        println!(
            "{:<12} {:<16} {:<14} {:<18} {:<10}",
            leg.destination_id, leg.target, leg.amount_usd, amount, leg.status
        );
        if let Some(e) = &leg.error {
            println!("  error: {}", e);
        }
    }

    println!();
    println!("Distributed: ${}", run.distributed_usd());
    if run.plan.unallocated_usd > Decimal::ZERO {
        println!("Retained ({}): ${}", OPERATIONAL_BUCKET, run.plan.unallocated_usd);
    }
    println!();

    Ok(())
}

/// Withdraw an amount now, outside any window
pub async fn withdraw(config: &Config, amount: Decimal) -> Result<()> {
    let app = App::simulated(config.clone());
    let record = app.monitor().force_withdrawal(amount).await?;

    if record.is_completed() {
        println!("\n=== WITHDRAWAL COMPLETED ===");
    } else {
        println!("\n=== WITHDRAWAL FAILED ===");
    }
    println!("{}", record.summary());
    if let Some(transfer) = &record.transfer {
        println!("Confirmations: {}", transfer.confirmations);
    }
    println!();

    if !record.is_completed() {
        anyhow::bail!(record.error.unwrap_or_else(|| "withdrawal failed".to_string()));
    }

    Ok(())
}

/// Show ledger history
pub async fn history(config: &Config, limit: usize) -> Result<()> {
    println!("\n=== LEDGER HISTORY ===\n");

    let entries = JsonlLedger::new(&config.ledger.path).load().await?;
    if entries.is_empty() {
        println!("No history found.");
        println!();
        return Ok(());
    }

    println!(
        "{:<18} {:<14} {:<14} {:<18}",
        "DATE", "TYPE", "USD", "OUTCOME"
    );
    println!("{}", "-".repeat(66));

    for entry in entries.iter().rev().take(limit) {
        match entry {
            LedgerEntry::Distribution(run) => println!(
                "{:<18} {:<14} {:<14} {:<18}",
                run.triggered_at.format("%Y-%m-%d %H:%M"),
                "distribution",
                run.plan.total_usd,
                run.outcome.to_string()
            ),
            LedgerEntry::Withdrawal(record) => println!(
                "{:<18} {:<14} {:<14} {:<18}",
                record.triggered_at.format("%Y-%m-%d %H:%M"),
                format!("{} {}", record.kind, record.asset),
                record.amount_usd,
                if record.is_completed() { "completed" } else { "failed" }
            ),
        }
    }

    println!();
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

fn print_status(status: &AppStatus) {
    println!("\n=== PROFIT ROUTER STATUS ===\n");

    let w = &status.withdrawal;
    match &w.window {
        Some(window) => println!(
            "Withdrawal window: {} (${} of ${}, {}%)",
            window.status,
            window.last_profit_usd.unwrap_or_default(),
            window.threshold_usd,
            window.progress_pct
        ),
        None => println!("Withdrawal window: none"),
    }
    println!(
        "Withdrawals: {} completed, {} failed, ${} withdrawn, {} windows expired",
        w.stats.completed, w.stats.failed, w.stats.total_withdrawn_usd, w.stats.windows_expired
    );

    let d = &status.distribution;
    println!(
        "Distributions: {} runs ({} completed, {} partial, {} failed), ${} distributed, {} ticks skipped",
        d.runs, d.completed, d.partially_failed, d.failed, d.total_distributed_usd, d.skipped_ticks
    );

    let s = &status.stablecoin;
    println!(
        "Stablecoin sweeps: {} ({} failed), ${} withdrawn, {} ticks skipped",
        s.sweeps, s.failed, s.total_withdrawn_usd, s.skipped_ticks
    );

    if let Some(run) = &status.last_distribution {
        println!("\nLast distribution:\n{}", run.summary());
    }
    println!();
}
