//! Ballast Liquidation Keeper
//!
//! Off-chain service that watches an engine snapshot, ranks positions by ICR
//! and liquidates the ones that are eligible at the current price.

mod config;
mod health;
mod price;
mod priority_queue;
mod snapshot;

use anyhow::{Context, Result};
use ballast_core::math::format_wad;
use ballast_core::{AccountId, EngineError, LiquidationOutcome, State};
use config::{expand_path, Config};
use health::{PositionHealth, SystemView};
use price::FilePriceFeed;
use priority_queue::HealthQueue;
use std::time::Duration;
use tokio::time;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Some(path) = std::env::args().skip_while(|a| a != "--write-default-config").nth(1) {
        return Config::write_default(&path);
    }

    log::info!("Starting Ballast Liquidation Keeper");

    let config = Config::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({:#}), using defaults", e);
        Config::default_local()
    });
    let snapshot_path = expand_path(&config.snapshot_path)?;
    let feed = FilePriceFeed::new(expand_path(&config.price_path)?);

    log::info!("Snapshot: {}", snapshot_path);
    log::info!("Liquidator account: {}", config.liquidator);

    let mut interval = time::interval(Duration::from_secs(config.poll_interval_secs.max(1)));

    loop {
        interval.tick().await;

        match run_tick(&config, &snapshot_path, &feed) {
            Ok(Some(outcome)) => log_compensation(&outcome),
            Ok(None) => log::debug!("Nothing to liquidate"),
            Err(e) => log::error!("Error processing liquidations: {:#}", e),
        }

        if config.single_pass {
            return Ok(());
        }
    }
}

/// One polling round: price, snapshot, rank, liquidate, persist
fn run_tick(config: &Config, snapshot_path: &str, feed: &FilePriceFeed) -> Result<Option<LiquidationOutcome>> {
    let price = feed.fetch()?;
    let mut state = snapshot::load(snapshot_path)?;

    let batch = select_batch(&state, price.0, config.max_liquidations_per_batch)?;
    if batch.is_empty() {
        return Ok(None);
    }
    log::info!("Found {} positions to liquidate at price {}", batch.len(), format_wad(price.0));
    for candidate in &batch {
        log::debug!(
            "Candidate {} ICR {} collateral {}",
            candidate.id,
            format_wad(candidate.icr),
            format_wad(candidate.coll)
        );
    }

    let ids: Vec<AccountId> = batch.iter().map(|h| h.id).collect();
    let outcome = match state.liquidate_batch(&ids, config.liquidator, &price) {
        Ok(outcome) => outcome,
        Err(EngineError::NothingToLiquidate) => return Ok(None),
        Err(e) => return Err(e).context("Batch liquidation failed"),
    };

    snapshot::save(snapshot_path, &state)?;
    Ok(Some(outcome))
}

/// Eligible positions, largest collateral first, capped so the last position
/// is never part of a batch
fn select_batch(state: &State, price: u128, max_batch: usize) -> Result<Vec<PositionHealth>> {
    let view = SystemView::capture(state, price)?;

    let mut queue = HealthQueue::new();
    for position in health::scan(state, price)? {
        queue.push(position);
    }
    if let Some(worst) = queue.peek() {
        log::debug!(
            "{} positions, worst {} at ICR {}, recovery mode {}",
            queue.len(),
            worst.id,
            format_wad(worst.icr),
            view.recovery
        );
    }

    let mut batch = queue.take_while(|h| view.is_liquidatable(h));
    batch.sort_by(|a, b| b.coll.cmp(&a.coll));
    let limit = max_batch.min(state.ledger().active_count().saturating_sub(1));
    batch.truncate(limit);
    Ok(batch)
}

fn log_compensation(outcome: &LiquidationOutcome) {
    log::info!(
        "Liquidated {} positions: compensation {} collateral + {} stable",
        outcome.liquidated.len(),
        format_wad(outcome.totals.coll_incentive),
        format_wad(outcome.totals.reserve_compensation)
    );
    for position in &outcome.liquidated {
        log::info!(
            "  {} {:?}, debt {}",
            position.id,
            position.path,
            format_wad(position.values.entire_debt)
        );
    }
}
