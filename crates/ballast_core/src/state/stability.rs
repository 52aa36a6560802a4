//! Stability Pool compounding
//!
//! Each offset scales every deposit by the same factor, so instead of touching
//! depositors the pool keeps a running product `P` and, per `(epoch, scale)`,
//! a running sum `S` of collateral gained per unit deposited (weighted by `P`).
//! A deposit stores `(P, S, scale, epoch)` when it last changed:
//!
//! - compounded = initial * P_now / P_snap, divided by 1e18 per scale crossed
//! - collateral gain = initial * (S[e][s] - S_snap + S[e][s+1] / 1e18) / P_snap
//!
//! `P` starts at 1e36 and lives in `[1e18, 1e36]`. An offset multiplies it by
//! at least one part in 1e18, so when it falls below 1e18 a single
//! multiplication by 1e18 brings it back and the scale goes up by exactly one.
//! When an offset empties the pool the epoch goes up and every older deposit
//! compounds to zero.

use crate::error::{EngineError, EngineResult};
use crate::math::{sub, to_u128, DECIMAL_PRECISION};
use crate::state::position::AccountId;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value of `P` at the start of every epoch
pub const P_PRECISION: u128 = 1_000_000_000_000_000_000_000_000_000_000_000_000;

/// Rescale factor for `P`, and the floor that triggers a rescale
pub const SCALE_FACTOR: u128 = 1_000_000_000_000_000_000;

/// A compounded deposit below this fraction of its principal reads as zero
const DUST_DIVISOR: u128 = 1_000_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositSnapshot {
    pub p: u128,
    pub s: U256,
    pub scale: u64,
    pub epoch: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub initial_value: u128,
    pub snapshot: DepositSnapshot,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityCompounder {
    p: u128,
    current_scale: u64,
    current_epoch: u64,
    /// `sums[epoch][scale]`
    sums: Vec<Vec<U256>>,
    last_coll_error: u128,
    last_debt_loss_error: u128,
    deposits: BTreeMap<AccountId, Deposit>,
}

impl Default for StabilityCompounder {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one offset step, computed before anything is written
struct OffsetStep {
    new_p: u128,
    new_scale: u64,
    new_epoch: u64,
    marginal_gain: U256,
    coll_error: u128,
    debt_loss_error: u128,
}

impl StabilityCompounder {
    pub fn new() -> Self {
        Self {
            p: P_PRECISION,
            current_scale: 0,
            current_epoch: 0,
            sums: vec![vec![U256::zero()]],
            last_coll_error: 0,
            last_debt_loss_error: 0,
            deposits: BTreeMap::new(),
        }
    }

    pub fn p(&self) -> u128 {
        self.p
    }

    pub fn current_scale(&self) -> u64 {
        self.current_scale
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch
    }

    pub fn sum_at(&self, epoch: u64, scale: u64) -> U256 {
        self.sums
            .get(epoch as usize)
            .and_then(|scales| scales.get(scale as usize))
            .copied()
            .unwrap_or_default()
    }

    fn sum_slot_mut(&mut self, epoch: u64, scale: u64) -> &mut U256 {
        let (e, s) = (epoch as usize, scale as usize);
        if self.sums.len() <= e {
            self.sums.resize(e + 1, Vec::new());
        }
        let scales = &mut self.sums[e];
        if scales.len() <= s {
            scales.resize(s + 1, U256::zero());
        }
        &mut scales[s]
    }

    pub fn deposit_of(&self, depositor: AccountId) -> Option<&Deposit> {
        self.deposits.get(&depositor)
    }

    pub fn depositors(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.deposits.keys().copied()
    }

    /// Absorb `debt` of liquidated positions against `total_deposits`, crediting `coll`
    pub fn offset(&mut self, debt: u128, coll: u128, total_deposits: u128) -> EngineResult<()> {
        if total_deposits == 0 || debt == 0 {
            return Ok(());
        }
        sub(total_deposits, debt, "stability pool deposits")?;

        let step = self.compute_offset(debt, coll, total_deposits)?;

        let slot = self.sum_slot_mut(self.current_epoch, self.current_scale);
        *slot = slot
            .checked_add(step.marginal_gain)
            .ok_or(EngineError::Overflow)?;

        if step.new_epoch != self.current_epoch {
            log::info!("stability pool emptied, epoch {} -> {}", self.current_epoch, step.new_epoch);
        } else if step.new_scale != self.current_scale {
            log::info!("stability pool P rescaled, scale {} -> {}", self.current_scale, step.new_scale);
        }

        self.p = step.new_p;
        self.current_scale = step.new_scale;
        self.current_epoch = step.new_epoch;
        self.last_coll_error = step.coll_error;
        self.last_debt_loss_error = step.debt_loss_error;
        // Make sure the new (epoch, scale) bucket exists for snapshots
        self.sum_slot_mut(step.new_epoch, step.new_scale);
        Ok(())
    }

    fn compute_offset(&self, debt: u128, coll: u128, total_deposits: u128) -> EngineResult<OffsetStep> {
        let total = U256::from(total_deposits);
        let dp = U256::from(DECIMAL_PRECISION);

        let coll_numerator = U256::from(coll) * dp + U256::from(self.last_coll_error);
        let (coll_per_unit, coll_error) = coll_numerator.div_mod(total);

        // Loss per unit is rounded up so compounded deposits never overstate the pool
        let (loss_per_unit, debt_loss_error) = if debt == total_deposits {
            (DECIMAL_PRECISION, 0)
        } else {
            let numerator = U256::from(debt) * dp;
            let carried = U256::from(self.last_debt_loss_error);
            if numerator <= carried {
                (0, to_u128(carried - numerator)?)
            } else {
                let numerator = numerator - carried;
                let per_unit = numerator / total + U256::one();
                (to_u128(per_unit)?, to_u128(per_unit * total - numerator)?)
            }
        };

        let marginal_gain = coll_per_unit
            .checked_mul(U256::from(self.p))
            .ok_or(EngineError::Overflow)?;

        let product_factor = sub(DECIMAL_PRECISION, loss_per_unit, "stability pool product")?;
        let (new_p, new_scale, new_epoch) = if product_factor == 0 {
            (P_PRECISION, 0, self.current_epoch + 1)
        } else {
            // P >= 1e18 and factor >= 1, so P * factor >= 1e18 and one rescale suffices
            let product = U256::from(self.p) * U256::from(product_factor);
            let scaled = product / dp;
            if scaled < U256::from(SCALE_FACTOR) {
                (to_u128(product * U256::from(SCALE_FACTOR) / dp)?, self.current_scale + 1, self.current_epoch)
            } else {
                (to_u128(scaled)?, self.current_scale, self.current_epoch)
            }
        };

        if new_p < SCALE_FACTOR {
            return Err(EngineError::Underflow("stability pool product"));
        }

        Ok(OffsetStep {
            new_p,
            new_scale,
            new_epoch,
            marginal_gain,
            coll_error: to_u128(coll_error)?,
            debt_loss_error,
        })
    }

    /// Current value of a deposit after every offset since its snapshot
    pub fn compounded_deposit(&self, depositor: AccountId) -> u128 {
        match self.deposits.get(&depositor) {
            Some(d) => self.compounded_from_snapshot(d.initial_value, &d.snapshot),
            None => 0,
        }
    }

    fn compounded_from_snapshot(&self, initial: u128, snap: &DepositSnapshot) -> u128 {
        if initial == 0 || snap.epoch != self.current_epoch || snap.p == 0 {
            return 0;
        }
        let value = U256::from(initial) * U256::from(self.p) / U256::from(snap.p);
        let compounded = match self.current_scale.saturating_sub(snap.scale) {
            0 => to_u128(value).unwrap_or(0),
            1 => to_u128(value / U256::from(SCALE_FACTOR)).unwrap_or(0),
            _ => 0,
        };
        // Below a billionth of the original the value is rounding noise
        if compounded < initial / DUST_DIVISOR {
            return 0;
        }
        compounded
    }

    /// Collateral earned by a deposit since its snapshot
    pub fn collateral_gain(&self, depositor: AccountId) -> EngineResult<u128> {
        let Some(d) = self.deposits.get(&depositor) else {
            return Ok(0);
        };
        if d.initial_value == 0 || d.snapshot.p == 0 {
            return Ok(0);
        }
        let snap = &d.snapshot;

        let first = self
            .sum_at(snap.epoch, snap.scale)
            .checked_sub(snap.s)
            .ok_or(EngineError::Underflow("stability pool sum"))?;
        let second = self.sum_at(snap.epoch, snap.scale + 1) / U256::from(SCALE_FACTOR);

        let sum = first.checked_add(second).ok_or(EngineError::Overflow)?;

        // initial * sum / (P_snap * 1e18), split so the product stays in 256 bits
        let dp = U256::from(DECIMAL_PRECISION);
        let p_snap = U256::from(snap.p);
        let initial = U256::from(d.initial_value);
        let (whole, frac) = sum.div_mod(p_snap);
        let gain = initial.checked_mul(whole).ok_or(EngineError::Overflow)? / dp
            + initial * frac / (p_snap * dp);
        to_u128(gain)
    }

    /// Record a depositor's new principal with a fresh snapshot
    pub fn update_deposit(&mut self, depositor: AccountId, new_value: u128) {
        if new_value == 0 {
            self.deposits.remove(&depositor);
            return;
        }
        let snapshot = DepositSnapshot {
            p: self.p,
            s: self.sum_at(self.current_epoch, self.current_scale),
            scale: self.current_scale,
            epoch: self.current_epoch,
        };
        self.deposits.insert(
            depositor,
            Deposit {
                initial_value: new_value,
                snapshot,
            },
        );
    }
}
