//! Mutating entry points besides liquidation
//!
//! Each one validates against read-only views first and writes afterwards, so
//! a returned error means nothing changed. The returned transfers are what
//! the host owes to or takes from accounts once the call has succeeded.

pub mod borrower;
pub mod redemption;
pub mod stability;

use crate::error::{EngineError, EngineResult};
use crate::math::{add, compute_cr, sub, DECIMAL_PRECISION};
use crate::state::position::AccountId;
use crate::state::State;

/// Expected neighbours in the sorted index; any value is accepted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Hints {
    pub prev: Option<AccountId>,
    pub next: Option<AccountId>,
}

impl Hints {
    pub fn new(prev: Option<AccountId>, next: Option<AccountId>) -> Self {
        Self { prev, next }
    }
}

/// Signed change to the system totals, for "what would TCR be" checks
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SystemChange {
    pub coll_added: u128,
    pub coll_removed: u128,
    pub debt_added: u128,
    pub debt_removed: u128,
}

impl State {
    pub(crate) fn tcr_after(&self, change: SystemChange, price: u128) -> EngineResult<u128> {
        let coll = sub(
            add(self.entire_system_coll()?, change.coll_added)?,
            change.coll_removed,
            "system collateral",
        )?;
        let debt = sub(
            add(self.entire_system_debt()?, change.debt_added)?,
            change.debt_removed,
            "system debt",
        )?;
        Ok(compute_cr(coll, debt, price))
    }
}

pub(crate) fn require_valid_max_fee(max_fee: u128, floor: u128) -> EngineResult<()> {
    if max_fee < floor || max_fee > DECIMAL_PRECISION {
        return Err(EngineError::InvalidMaxFee(max_fee));
    }
    Ok(())
}

/// The fee as a fraction of `amount` must not exceed what the caller accepted
pub(crate) fn require_user_accepts_fee(fee: u128, amount: u128, max_fee: u128) -> EngineResult<()> {
    if amount == 0 {
        return Ok(());
    }
    let actual = crate::math::mul_div(fee, DECIMAL_PRECISION, amount)?;
    if actual > max_fee {
        return Err(EngineError::FeeExceedsMaximum { actual, max: max_fee });
    }
    Ok(())
}
