//! Protocol parameters

use crate::error::{EngineError, EngineResult};
use crate::math::{percent, wad, DECIMAL_PRECISION};
use serde::{Deserialize, Serialize};

/// Tunable constants of the engine. All ratios and rates are 18-decimal fixed point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParams {
    /// Minimum collateral ratio; below it a position is liquidatable
    pub mcr: u128,

    /// Critical system collateral ratio; below it the system is in Recovery Mode
    pub ccr: u128,

    /// Stablecoin set aside from every position's debt and paid to the liquidator
    pub liquidation_reserve: u128,

    /// Smallest debt a position may carry, reserve excluded
    pub min_net_debt: u128,

    /// Liquidator collateral incentive is `coll / coll_incentive_divisor`
    pub coll_incentive_divisor: u128,

    pub borrowing_fee_floor: u128,
    pub max_borrowing_fee: u128,
    pub redemption_fee_floor: u128,

    /// Per-minute base rate decay (12 hour half-life by default)
    pub minute_decay_factor: u128,

    /// Divisor applied to the redeemed fraction when bumping the base rate
    pub beta: u128,

    /// Capacity of the sorted index
    pub max_positions: usize,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            mcr: percent(110),
            ccr: percent(150),
            liquidation_reserve: wad(200),
            min_net_debt: wad(1800),
            coll_incentive_divisor: 200,
            borrowing_fee_floor: DECIMAL_PRECISION / 1000 * 5,
            max_borrowing_fee: percent(5),
            redemption_fee_floor: DECIMAL_PRECISION / 1000 * 5,
            minute_decay_factor: 999_037_758_833_783_000,
            beta: 2,
            max_positions: 1_000_000,
        }
    }
}

impl ProtocolParams {
    pub fn validate(&self) -> EngineResult<()> {
        if self.mcr <= DECIMAL_PRECISION {
            return Err(EngineError::InvalidParams("mcr must exceed 100%"));
        }
        if self.ccr <= self.mcr {
            return Err(EngineError::InvalidParams("ccr must exceed mcr"));
        }
        if self.coll_incentive_divisor == 0 {
            return Err(EngineError::InvalidParams("coll_incentive_divisor must be non-zero"));
        }
        if self.borrowing_fee_floor > self.max_borrowing_fee || self.max_borrowing_fee > DECIMAL_PRECISION {
            return Err(EngineError::InvalidParams("borrowing fee bounds out of range"));
        }
        if self.redemption_fee_floor > DECIMAL_PRECISION {
            return Err(EngineError::InvalidParams("redemption_fee_floor exceeds 100%"));
        }
        if self.minute_decay_factor == 0 || self.minute_decay_factor >= DECIMAL_PRECISION {
            return Err(EngineError::InvalidParams("minute_decay_factor must be in (0, 1)"));
        }
        if self.beta == 0 {
            return Err(EngineError::InvalidParams("beta must be non-zero"));
        }
        if self.max_positions == 0 {
            return Err(EngineError::InvalidParams("max_positions must be non-zero"));
        }
        Ok(())
    }

    /// Liquidator's share of `coll`
    pub fn coll_incentive(&self, coll: u128) -> u128 {
        coll / self.coll_incentive_divisor
    }

    /// Debt as stored, reserve included
    pub fn gross_debt(&self, net_debt: u128) -> EngineResult<u128> {
        crate::math::add(net_debt, self.liquidation_reserve)
    }

    /// Debt net of the liquidation reserve
    pub fn net_debt(&self, gross_debt: u128) -> u128 {
        gross_debt.saturating_sub(self.liquidation_reserve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = ProtocolParams::default();
        params.validate().unwrap();
        assert_eq!(params.coll_incentive(wad(10)), wad(10) / 200);
        assert_eq!(params.gross_debt(wad(1800)).unwrap(), wad(2000));
        assert_eq!(params.net_debt(wad(2000)), wad(1800));
    }

    #[test]
    fn test_validate_rejects_ccr_below_mcr() {
        let params = ProtocolParams {
            ccr: percent(105),
            ..ProtocolParams::default()
        };
        assert_eq!(params.validate(), Err(EngineError::InvalidParams("ccr must exceed mcr")));
    }

    #[test]
    fn test_partial_params_fill_defaults() {
        let params: ProtocolParams = serde_json::from_str(r#"{"beta": 3}"#).unwrap();
        assert_eq!(params.beta, 3);
        assert_eq!(params.mcr, percent(110));
    }
}
