//! Redistribution accumulator
//!
//! `L_coll` and `L_debt` are running sums of collateral and debt redistributed
//! per unit of stake. A position's pending reward is its stake times the growth
//! of the sums since its snapshot, so a redistribution touches no position.
//! The division remainder is carried into the next redistribution's numerator.
//!
//! Stakes are decoupled from raw collateral: new stakes are issued at the
//! stake/collateral ratio captured after the last liquidation, so a position
//! opened later neither dilutes nor claims rewards already owed to others.

use crate::error::{EngineError, EngineResult};
use crate::math::{add, mul_div, sub, to_u128, DECIMAL_PRECISION};
use crate::state::position::{Position, RewardSnapshot};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardAccumulator {
    l_coll: u128,
    l_debt: u128,
    err_coll: u128,
    err_debt: u128,
    total_stakes_snapshot: u128,
    total_collateral_snapshot: u128,
}

/// Split `amount * 1e18 + carried_error` over `total_stakes`
fn per_unit_staked(amount: u128, carried_error: u128, total_stakes: u128) -> EngineResult<(u128, u128)> {
    if total_stakes == 0 {
        return Err(EngineError::DivisionByZero);
    }
    let numerator = U256::from(amount) * U256::from(DECIMAL_PRECISION) + U256::from(carried_error);
    let (per_unit, remainder) = numerator.div_mod(U256::from(total_stakes));
    Ok((to_u128(per_unit)?, to_u128(remainder)?))
}

impl RewardAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn l_coll(&self) -> u128 {
        self.l_coll
    }

    pub fn l_debt(&self) -> u128 {
        self.l_debt
    }

    pub fn errors(&self) -> (u128, u128) {
        (self.err_coll, self.err_debt)
    }

    pub fn stake_snapshots(&self) -> (u128, u128) {
        (self.total_stakes_snapshot, self.total_collateral_snapshot)
    }

    /// Snapshot to store on a position that has just been brought up to date
    pub fn snapshot(&self) -> RewardSnapshot {
        RewardSnapshot {
            coll_per_stake: self.l_coll,
            debt_per_stake: self.l_debt,
        }
    }

    /// `(collateral, debt)` owed to a position since its snapshot
    pub fn pending_rewards(&self, position: &Position) -> EngineResult<(u128, u128)> {
        if !position.is_active() || position.stake == 0 {
            return Ok((0, 0));
        }
        let coll_per_stake = sub(self.l_coll, position.snapshot.coll_per_stake, "reward snapshot")?;
        let debt_per_stake = sub(self.l_debt, position.snapshot.debt_per_stake, "reward snapshot")?;
        Ok((
            mul_div(position.stake, coll_per_stake, DECIMAL_PRECISION)?,
            mul_div(position.stake, debt_per_stake, DECIMAL_PRECISION)?,
        ))
    }

    pub fn has_pending_rewards(&self, position: &Position) -> bool {
        position.is_active()
            && (position.snapshot.coll_per_stake < self.l_coll || position.snapshot.debt_per_stake < self.l_debt)
    }

    /// Spread liquidated collateral and debt over every unit of active stake
    pub fn redistribute(&mut self, coll: u128, debt: u128, total_stakes: u128) -> EngineResult<()> {
        if debt == 0 {
            return Ok(());
        }
        let (coll_per_unit, err_coll) = per_unit_staked(coll, self.err_coll, total_stakes)?;
        let (debt_per_unit, err_debt) = per_unit_staked(debt, self.err_debt, total_stakes)?;
        let l_coll = add(self.l_coll, coll_per_unit)?;
        let l_debt = add(self.l_debt, debt_per_unit)?;

        self.l_coll = l_coll;
        self.l_debt = l_debt;
        self.err_coll = err_coll;
        self.err_debt = err_debt;

        log::debug!(
            "redistributed coll={} debt={} over stakes={}, L_coll={} L_debt={}",
            coll,
            debt,
            total_stakes,
            l_coll,
            l_debt
        );
        Ok(())
    }

    /// Stake for a position holding `coll`, at the ratio of the last snapshot
    pub fn compute_stake(&self, coll: u128) -> EngineResult<u128> {
        if self.total_collateral_snapshot == 0 || self.total_stakes_snapshot == 0 {
            return Ok(coll);
        }
        mul_div(coll, self.total_stakes_snapshot, self.total_collateral_snapshot)
    }

    /// Capture the stake/collateral ratio after a liquidation.
    ///
    /// `total_collateral` covers the Active and Default pools, i.e. the
    /// collateral that current stakes have a claim on.
    pub fn update_stake_snapshots(&mut self, total_stakes: u128, total_collateral: u128) {
        self.total_stakes_snapshot = total_stakes;
        self.total_collateral_snapshot = total_collateral;
    }
}
