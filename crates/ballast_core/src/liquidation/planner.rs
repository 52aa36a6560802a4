//! Per-candidate liquidation decisions
//!
//! Pure functions: given a position's entire debt and collateral, its ICR, the
//! system mode and what is left in the Stability Pool, work out how the
//! position would be liquidated. Nothing here touches state.

use crate::error::EngineResult;
use crate::math::{mul_div, sub, DECIMAL_PRECISION};
use crate::params::ProtocolParams;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationPath {
    /// Stability Pool absorbed all of the debt
    FullyOffset,
    /// Stability Pool absorbed part of the debt, the rest was redistributed
    PartiallyOffset,
    /// Nothing offset, everything redistributed
    PureRedistribution,
}

/// How one position's debt and collateral are split up
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationValues {
    pub entire_debt: u128,
    pub entire_coll: u128,
    /// Collateral paid to the liquidator
    pub coll_incentive: u128,
    /// Stablecoin reserve paid to the liquidator
    pub reserve_compensation: u128,
    pub debt_to_offset: u128,
    pub coll_to_send_to_sp: u128,
    pub debt_to_redistribute: u128,
    pub coll_to_redistribute: u128,
    /// Collateral returned to the owner through the surplus pool
    pub coll_surplus: u128,
}

impl LiquidationValues {
    pub fn path(&self) -> LiquidationPath {
        if self.debt_to_offset == 0 {
            LiquidationPath::PureRedistribution
        } else if self.debt_to_redistribute == 0 {
            LiquidationPath::FullyOffset
        } else {
            LiquidationPath::PartiallyOffset
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Skip,
    Liquidate(LiquidationValues),
}

/// Split `debt` (and proportionally `coll`) between the pool and redistribution.
/// Returns `(debt_to_offset, coll_to_sp, debt_to_redistribute, coll_to_redistribute)`.
pub fn offset_and_redistribution(
    debt: u128,
    coll: u128,
    sp_remaining: u128,
) -> EngineResult<(u128, u128, u128, u128)> {
    if sp_remaining == 0 || debt == 0 {
        return Ok((0, 0, debt, coll));
    }
    let debt_to_offset = debt.min(sp_remaining);
    let coll_to_sp = mul_div(coll, debt_to_offset, debt)?;
    Ok((
        debt_to_offset,
        coll_to_sp,
        sub(debt, debt_to_offset, "liquidated debt")?,
        sub(coll, coll_to_sp, "liquidated collateral")?,
    ))
}

/// Normal Mode rule, also used in Recovery Mode for 100% < ICR < MCR
pub fn plan_normal(
    entire_debt: u128,
    entire_coll: u128,
    sp_remaining: u128,
    params: &ProtocolParams,
) -> EngineResult<LiquidationValues> {
    let coll_incentive = params.coll_incentive(entire_coll);
    let coll_to_liquidate = sub(entire_coll, coll_incentive, "liquidated collateral")?;
    let (debt_to_offset, coll_to_send_to_sp, debt_to_redistribute, coll_to_redistribute) =
        offset_and_redistribution(entire_debt, coll_to_liquidate, sp_remaining)?;

    Ok(LiquidationValues {
        entire_debt,
        entire_coll,
        coll_incentive,
        reserve_compensation: params.liquidation_reserve,
        debt_to_offset,
        coll_to_send_to_sp,
        debt_to_redistribute,
        coll_to_redistribute,
        coll_surplus: 0,
    })
}

/// Everything but the incentive is redistributed
fn plan_pure_redistribution(entire_debt: u128, entire_coll: u128, params: &ProtocolParams) -> EngineResult<LiquidationValues> {
    let coll_incentive = params.coll_incentive(entire_coll);
    Ok(LiquidationValues {
        entire_debt,
        entire_coll,
        coll_incentive,
        reserve_compensation: params.liquidation_reserve,
        debt_to_redistribute: entire_debt,
        coll_to_redistribute: sub(entire_coll, coll_incentive, "liquidated collateral")?,
        ..LiquidationValues::default()
    })
}

/// Offset the whole debt against collateral worth exactly `debt * MCR`; the
/// owner keeps the rest as a surplus
fn plan_capped_offset(
    entire_debt: u128,
    entire_coll: u128,
    price: u128,
    params: &ProtocolParams,
) -> EngineResult<LiquidationValues> {
    let capped_coll = mul_div(entire_debt, params.mcr, price)?.min(entire_coll);
    let coll_incentive = params.coll_incentive(capped_coll);
    Ok(LiquidationValues {
        entire_debt,
        entire_coll,
        coll_incentive,
        reserve_compensation: params.liquidation_reserve,
        debt_to_offset: entire_debt,
        coll_to_send_to_sp: sub(capped_coll, coll_incentive, "capped collateral")?,
        coll_surplus: sub(entire_coll, capped_coll, "capped collateral")?,
        ..LiquidationValues::default()
    })
}

/// Inputs for one candidate
#[derive(Clone, Copy, Debug)]
pub struct Candidate {
    pub entire_debt: u128,
    pub entire_coll: u128,
    pub icr: u128,
}

pub fn decide_normal(candidate: &Candidate, sp_remaining: u128, params: &ProtocolParams) -> EngineResult<Decision> {
    if candidate.icr >= params.mcr {
        return Ok(Decision::Skip);
    }
    plan_normal(candidate.entire_debt, candidate.entire_coll, sp_remaining, params).map(Decision::Liquidate)
}

/// Recovery Mode rule against the running system `tcr`
pub fn decide_recovery(
    candidate: &Candidate,
    sp_remaining: u128,
    tcr: u128,
    price: u128,
    params: &ProtocolParams,
) -> EngineResult<Decision> {
    let Candidate {
        entire_debt,
        entire_coll,
        icr,
    } = *candidate;

    if icr <= DECIMAL_PRECISION {
        plan_pure_redistribution(entire_debt, entire_coll, params).map(Decision::Liquidate)
    } else if icr < params.mcr {
        plan_normal(entire_debt, entire_coll, sp_remaining, params).map(Decision::Liquidate)
    } else if icr < tcr && entire_debt <= sp_remaining {
        plan_capped_offset(entire_debt, entire_coll, price, params).map(Decision::Liquidate)
    } else {
        Ok(Decision::Skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{percent, wad};

    fn candidate(coll: u128, debt: u128, price: u128) -> Candidate {
        Candidate {
            entire_debt: debt,
            entire_coll: coll,
            icr: crate::math::compute_cr(coll, debt, price),
        }
    }

    #[test]
    fn test_normal_full_offset() {
        let params = ProtocolParams::default();
        // 10 coll at 200 = 2000 against 2000 debt: ICR 100%
        let c = candidate(wad(10), wad(2000), wad(200));
        let Decision::Liquidate(v) = decide_normal(&c, wad(5000), &params).unwrap() else {
            panic!("expected liquidation");
        };
        assert_eq!(v.path(), LiquidationPath::FullyOffset);
        assert_eq!(v.coll_incentive, wad(10) / 200);
        assert_eq!(v.coll_to_send_to_sp, wad(10) - wad(10) / 200);
        assert_eq!(v.debt_to_offset, wad(2000));
        assert_eq!(v.reserve_compensation, wad(200));
    }

    #[test]
    fn test_normal_partial_offset_splits_pro_rata() {
        let params = ProtocolParams::default();
        let c = candidate(wad(10), wad(2000), wad(200));
        let Decision::Liquidate(v) = decide_normal(&c, wad(500), &params).unwrap() else {
            panic!("expected liquidation");
        };
        assert_eq!(v.path(), LiquidationPath::PartiallyOffset);
        assert_eq!(v.debt_to_offset, wad(500));
        assert_eq!(v.debt_to_redistribute, wad(1500));
        let liquidated = wad(10) - wad(10) / 200;
        assert_eq!(v.coll_to_send_to_sp, liquidated / 4);
        assert_eq!(v.coll_to_send_to_sp + v.coll_to_redistribute, liquidated);
    }

    #[test]
    fn test_normal_skips_healthy() {
        let params = ProtocolParams::default();
        let c = candidate(wad(12), wad(2000), wad(200));
        assert_eq!(decide_normal(&c, wad(5000), &params).unwrap(), Decision::Skip);
    }

    #[test]
    fn test_recovery_below_100_percent_redistributes() {
        let params = ProtocolParams::default();
        let c = candidate(wad(9), wad(2000), wad(200));
        let Decision::Liquidate(v) = decide_recovery(&c, wad(5000), percent(120), wad(200), &params).unwrap() else {
            panic!("expected liquidation");
        };
        assert_eq!(v.path(), LiquidationPath::PureRedistribution);
        assert_eq!(v.debt_to_redistribute, wad(2000));
        assert_eq!(v.coll_to_redistribute + v.coll_incentive, wad(9));
    }

    #[test]
    fn test_recovery_capped_offset_leaves_surplus() {
        let params = ProtocolParams::default();
        // ICR 120% with TCR 130%
        let c = candidate(wad(12), wad(2000), wad(200));
        let Decision::Liquidate(v) = decide_recovery(&c, wad(5000), percent(130), wad(200), &params).unwrap() else {
            panic!("expected liquidation");
        };
        assert_eq!(v.path(), LiquidationPath::FullyOffset);
        // 2000 * 1.1 / 200 = 11 collateral capped
        assert_eq!(v.coll_incentive, wad(11) / 200);
        assert_eq!(v.coll_to_send_to_sp, wad(11) - wad(11) / 200);
        assert_eq!(v.coll_surplus, wad(1));
    }

    #[test]
    fn test_recovery_capped_offset_needs_full_pool() {
        let params = ProtocolParams::default();
        let c = candidate(wad(12), wad(2000), wad(200));
        assert_eq!(
            decide_recovery(&c, wad(1999), percent(130), wad(200), &params).unwrap(),
            Decision::Skip
        );
        // At or above TCR never liquidates
        assert_eq!(
            decide_recovery(&c, wad(5000), percent(120), wad(200), &params).unwrap(),
            Decision::Skip
        );
    }
}
