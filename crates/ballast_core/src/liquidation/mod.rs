//! Liquidation orchestrator
//!
//! Every entry point runs in two phases. Planning walks the candidates against
//! a running copy of the Stability Pool balance and system totals, deciding
//! per position and detecting a return to Normal Mode mid-batch; it performs
//! every check and writes nothing. Applying then closes the positions and
//! moves the batch totals through the pools and accumulators once, on a copy
//! of the state that is committed only if every step succeeds.

pub mod planner;

use crate::error::{EngineError, EngineResult};
use crate::hooks::Transfer;
use crate::math::{add, compute_cr, sub};
use crate::oracle::PriceFeed;
use crate::state::pools::{Asset, Pool};
use crate::state::position::{AccountId, Status};
use crate::state::State;
use planner::{decide_normal, decide_recovery, Candidate, Decision};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use planner::{LiquidationPath, LiquidationValues};

/// Sums of [`LiquidationValues`] over a batch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationTotals {
    pub coll_in_sequence: u128,
    pub debt_in_sequence: u128,
    pub coll_incentive: u128,
    pub reserve_compensation: u128,
    pub debt_to_offset: u128,
    pub coll_to_send_to_sp: u128,
    pub debt_to_redistribute: u128,
    pub coll_to_redistribute: u128,
    pub coll_surplus: u128,
}

impl LiquidationTotals {
    fn accumulate(&mut self, v: &LiquidationValues) -> EngineResult<()> {
        self.coll_in_sequence = add(self.coll_in_sequence, v.entire_coll)?;
        self.debt_in_sequence = add(self.debt_in_sequence, v.entire_debt)?;
        self.coll_incentive = add(self.coll_incentive, v.coll_incentive)?;
        self.reserve_compensation = add(self.reserve_compensation, v.reserve_compensation)?;
        self.debt_to_offset = add(self.debt_to_offset, v.debt_to_offset)?;
        self.coll_to_send_to_sp = add(self.coll_to_send_to_sp, v.coll_to_send_to_sp)?;
        self.debt_to_redistribute = add(self.debt_to_redistribute, v.debt_to_redistribute)?;
        self.coll_to_redistribute = add(self.coll_to_redistribute, v.coll_to_redistribute)?;
        self.coll_surplus = add(self.coll_surplus, v.coll_surplus)?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidatedPosition {
    pub id: AccountId,
    pub path: LiquidationPath,
    /// Whether the Recovery Mode rule applied to this position
    pub recovery_mode: bool,
    pub values: LiquidationValues,
    /// Redistribution rewards folded in before closing
    pub pending_coll: u128,
    pub pending_debt: u128,
    pub stake: u128,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationOutcome {
    pub liquidated: Vec<LiquidatedPosition>,
    pub totals: LiquidationTotals,
    /// Liquidator payouts, to be dispatched after the state change is committed
    pub transfers: Vec<Transfer>,
}

impl LiquidationOutcome {
    pub fn liquidated_ids(&self) -> Vec<AccountId> {
        self.liquidated.iter().map(|p| p.id).collect()
    }
}

/// What to do with a candidate that cannot be liquidated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Walk {
    /// Candidates come from the worst end of the index: stop
    Sequence,
    /// Caller-chosen list: move on to the next one
    Batch,
}

#[derive(Default)]
struct Plan {
    liquidated: Vec<LiquidatedPosition>,
    totals: LiquidationTotals,
    stakes_removed: u128,
}

impl State {
    /// Liquidate a single position
    pub fn liquidate<P: PriceFeed>(
        &mut self,
        id: AccountId,
        liquidator: AccountId,
        feed: &P,
    ) -> EngineResult<LiquidationOutcome> {
        self.require_active(id)?;
        self.liquidate_batch(&[id], liquidator, feed)
    }

    /// Liquidate every liquidatable position in `ids`, skipping the rest
    pub fn liquidate_batch<P: PriceFeed>(
        &mut self,
        ids: &[AccountId],
        liquidator: AccountId,
        feed: &P,
    ) -> EngineResult<LiquidationOutcome> {
        if ids.is_empty() {
            return Err(EngineError::NothingToLiquidate);
        }
        let price = feed.current_price()?;
        let plan = self.plan_liquidations(ids.iter().copied(), Walk::Batch, price)?;
        self.apply_liquidations(plan, liquidator, price)
    }

    /// Liquidate up to `n` positions starting from the worst, stopping at the
    /// first one that is not liquidatable
    pub fn liquidate_worst_n<P: PriceFeed>(
        &mut self,
        n: usize,
        liquidator: AccountId,
        feed: &P,
    ) -> EngineResult<LiquidationOutcome> {
        let price = feed.current_price()?;
        let plan = self.plan_liquidations(self.index.iter_from_worst().take(n), Walk::Sequence, price)?;
        self.apply_liquidations(plan, liquidator, price)
    }

    fn plan_liquidations<I>(&self, candidates: I, walk: Walk, price: u128) -> EngineResult<Plan>
    where
        I: IntoIterator<Item = AccountId>,
    {
        let params = &self.params;
        let mut sp_remaining = self.total_deposits();
        let mut system_coll = self.entire_system_coll()?;
        let mut system_debt = self.entire_system_debt()?;
        let mut recovery = compute_cr(system_coll, system_debt, price) < params.ccr;
        let mut remaining_positions = self.ledger.active_count();
        let mut seen = BTreeSet::new();
        let mut plan = Plan::default();

        for id in candidates {
            if !seen.insert(id) {
                continue;
            }
            let Some(position) = self.ledger.get(id).filter(|p| p.is_active()) else {
                log::warn!("liquidation candidate {} is not active, skipping", id);
                continue;
            };
            let entire = self.get_entire_debt_and_coll(id)?;
            let candidate = Candidate {
                entire_debt: entire.debt,
                entire_coll: entire.coll,
                icr: compute_cr(entire.coll, entire.debt, price),
            };

            let decision = if recovery {
                if candidate.icr >= params.mcr && sp_remaining == 0 {
                    if walk == Walk::Sequence {
                        break;
                    }
                    log::warn!("{} not liquidatable with an empty stability pool, skipping", id);
                    continue;
                }
                let tcr = compute_cr(system_coll, system_debt, price);
                decide_recovery(&candidate, sp_remaining, tcr, price, params)?
            } else {
                decide_normal(&candidate, sp_remaining, params)?
            };

            let values = match decision {
                Decision::Liquidate(values) => values,
                Decision::Skip if walk == Walk::Sequence && !recovery => break,
                Decision::Skip => {
                    if walk == Walk::Batch {
                        log::warn!("{} with ICR {} is not liquidatable, skipping", id, candidate.icr);
                    } else {
                        log::debug!("{} with ICR {} skipped in recovery mode", id, candidate.icr);
                    }
                    continue;
                }
            };

            if remaining_positions <= 1 {
                return Err(EngineError::LastPosition);
            }
            remaining_positions -= 1;

            log::debug!(
                "{} ICR {}: {:?}, offset {} redistribute {}",
                id,
                candidate.icr,
                values.path(),
                values.debt_to_offset,
                values.debt_to_redistribute
            );

            let applied_in_recovery = recovery;
            sp_remaining = sub(sp_remaining, values.debt_to_offset, "stability pool deposits")?;
            if recovery {
                system_debt = sub(system_debt, values.debt_to_offset, "system debt")?;
                let coll_leaving = add(
                    add(values.coll_to_send_to_sp, values.coll_incentive)?,
                    values.coll_surplus,
                )?;
                system_coll = sub(system_coll, coll_leaving, "system collateral")?;
                recovery = compute_cr(system_coll, system_debt, price) < params.ccr;
                if !recovery {
                    log::info!("system back in normal mode after liquidating {}", id);
                }
            }

            plan.totals.accumulate(&values)?;
            plan.stakes_removed = add(plan.stakes_removed, position.stake)?;
            plan.liquidated.push(LiquidatedPosition {
                id,
                path: values.path(),
                recovery_mode: applied_in_recovery,
                values,
                pending_coll: entire.pending_coll,
                pending_debt: entire.pending_debt,
                stake: position.stake,
            });
        }

        if plan.liquidated.is_empty() {
            return Err(EngineError::NothingToLiquidate);
        }
        Ok(plan)
    }

    /// Writes go to a copy of the state that replaces `self` only once every
    /// step has succeeded
    fn apply_liquidations(&mut self, plan: Plan, liquidator: AccountId, price: u128) -> EngineResult<LiquidationOutcome> {
        let mut next = self.clone();
        let outcome = next.write_liquidations(plan, liquidator, price)?;
        *self = next;
        Ok(outcome)
    }

    fn write_liquidations(&mut self, plan: Plan, liquidator: AccountId, price: u128) -> EngineResult<LiquidationOutcome> {
        let Plan {
            liquidated,
            totals,
            stakes_removed,
        } = plan;

        let stakes_after = sub(self.ledger.total_stakes(), stakes_removed, "total stakes")?;
        self.rewards
            .redistribute(totals.coll_to_redistribute, totals.debt_to_redistribute, stakes_after)?;
        let total_deposits = self.total_deposits();
        self.stability
            .offset(totals.debt_to_offset, totals.coll_to_send_to_sp, total_deposits)?;

        for p in &liquidated {
            self.pools
                .transfer(Pool::Default, Pool::Active, Asset::Collateral, p.pending_coll)?;
            self.pools
                .transfer(Pool::Default, Pool::Active, Asset::Stable, p.pending_debt)?;
            self.close_position(p.id, Status::ClosedByLiquidation)?;
            if p.values.coll_surplus > 0 {
                self.pools.account_surplus(p.id, p.values.coll_surplus)?;
            }
        }

        // Offset: cancel debt against deposits, hand the pool its collateral
        self.pools.withdraw(Pool::Active, Asset::Stable, totals.debt_to_offset)?;
        self.pools.withdraw(Pool::Stability, Asset::Stable, totals.debt_to_offset)?;
        self.pools
            .transfer(Pool::Active, Pool::Stability, Asset::Collateral, totals.coll_to_send_to_sp)?;

        self.pools
            .transfer(Pool::Active, Pool::Default, Asset::Stable, totals.debt_to_redistribute)?;
        self.pools
            .transfer(Pool::Active, Pool::Default, Asset::Collateral, totals.coll_to_redistribute)?;

        self.pools
            .transfer(Pool::Active, Pool::Surplus, Asset::Collateral, totals.coll_surplus)?;
        self.pools.pay_incentive(totals.coll_incentive)?;
        self.refresh_stake_snapshots()?;

        let mut transfers = Vec::new();
        if totals.coll_incentive > 0 {
            transfers.push(Transfer::CollateralTo {
                recipient: liquidator,
                amount: totals.coll_incentive,
            });
        }
        if totals.reserve_compensation > 0 {
            transfers.push(Transfer::StableTo {
                recipient: liquidator,
                amount: totals.reserve_compensation,
            });
        }

        log::info!(
            "liquidated {} positions at price {}: offset {} redistributed {} surplus {}",
            liquidated.len(),
            price,
            totals.debt_to_offset,
            totals.debt_to_redistribute,
            totals.coll_surplus
        );

        Ok(LiquidationOutcome {
            liquidated,
            totals,
            transfers,
        })
    }
}
