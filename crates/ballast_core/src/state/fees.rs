//! Base rate with continuous exponential decay
//!
//! The rate is never decayed in place by a background task. Any reader
//! computes `base_rate * decay^minutes_since_last_operation`, and the stored
//! value is only rewritten by fee-charging operations.

use crate::error::{EngineError, EngineResult};
use crate::math::{add, dec_mul, dec_pow, mul_div, DECIMAL_PRECISION};
use crate::params::ProtocolParams;
use serde::{Deserialize, Serialize};

pub const SECONDS_IN_ONE_MINUTE: u64 = 60;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeClock {
    base_rate: u128,
    last_fee_operation_time: u64,
}

impl FeeClock {
    pub fn new(now: u64) -> Self {
        Self {
            base_rate: 0,
            last_fee_operation_time: now,
        }
    }

    pub fn base_rate(&self) -> u128 {
        self.base_rate
    }

    pub fn last_fee_operation_time(&self) -> u64 {
        self.last_fee_operation_time
    }

    fn minutes_passed(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_fee_operation_time) / SECONDS_IN_ONE_MINUTE
    }

    pub fn decayed_base_rate(&self, now: u64, params: &ProtocolParams) -> EngineResult<u128> {
        let factor = dec_pow(params.minute_decay_factor, self.minutes_passed(now))?;
        dec_mul(self.base_rate, factor)
    }

    /// Borrowing rate at `now`, before any bump from the current operation
    pub fn borrowing_rate(&self, now: u64, params: &ProtocolParams) -> EngineResult<u128> {
        let rate = add(params.borrowing_fee_floor, self.decayed_base_rate(now, params)?)?;
        Ok(rate.min(params.max_borrowing_fee))
    }

    pub fn borrowing_fee(&self, debt: u128, now: u64, params: &ProtocolParams) -> EngineResult<u128> {
        mul_div(self.borrowing_rate(now, params)?, debt, DECIMAL_PRECISION)
    }

    /// Redemption rate at the stored base rate
    pub fn redemption_rate(&self, params: &ProtocolParams) -> EngineResult<u128> {
        let rate = add(params.redemption_fee_floor, self.base_rate)?;
        Ok(rate.min(DECIMAL_PRECISION))
    }

    /// Redemption fee on `coll_drawn`; refused if it would take all of it
    pub fn redemption_fee(&self, coll_drawn: u128, params: &ProtocolParams) -> EngineResult<u128> {
        let fee = mul_div(self.redemption_rate(params)?, coll_drawn, DECIMAL_PRECISION)?;
        if fee >= coll_drawn {
            return Err(EngineError::UnableToRedeem);
        }
        Ok(fee)
    }

    /// Fee for issuing `new_debt`, priced before the bump, then bump the rate.
    ///
    /// `total_supply_after` is the stablecoin supply including `new_debt`.
    pub fn record_issuance(
        &mut self,
        new_debt: u128,
        total_supply_after: u128,
        now: u64,
        params: &ProtocolParams,
    ) -> EngineResult<u128> {
        let decayed = self.decayed_base_rate(now, params)?;
        let rate = add(params.borrowing_fee_floor, decayed)?.min(params.max_borrowing_fee);
        let fee = mul_div(rate, new_debt, DECIMAL_PRECISION)?;

        let fraction = mul_div(new_debt, DECIMAL_PRECISION, total_supply_after)?;
        self.base_rate = add(decayed, fraction)?.min(DECIMAL_PRECISION);
        self.touch(now);

        log::debug!("issuance of {} bumped base rate to {}", new_debt, self.base_rate);
        Ok(fee)
    }

    /// Bump the rate for a redemption worth `redeemed_value` out of `total_supply`
    pub fn record_redemption(
        &mut self,
        redeemed_value: u128,
        total_supply: u128,
        now: u64,
        params: &ProtocolParams,
    ) -> EngineResult<()> {
        let decayed = self.decayed_base_rate(now, params)?;
        let fraction = mul_div(redeemed_value, DECIMAL_PRECISION, total_supply)?;
        let new_rate = add(decayed, fraction / params.beta)?.min(DECIMAL_PRECISION);
        if new_rate == 0 {
            return Err(EngineError::Underflow("base rate"));
        }
        self.base_rate = new_rate;
        self.touch(now);

        log::debug!("redemption of {} bumped base rate to {}", redeemed_value, new_rate);
        Ok(())
    }

    /// Only advance the clock once a full minute has passed, so a stream of
    /// same-minute operations cannot hold the rate up
    fn touch(&mut self, now: u64) {
        if now.saturating_sub(self.last_fee_operation_time) >= SECONDS_IN_ONE_MINUTE {
            self.last_fee_operation_time = now;
        }
    }
}
