//! Position health as the keeper sees it

use anyhow::Result;
use ballast_core::math::compute_cr;
use ballast_core::{AccountId, State};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionHealth {
    pub id: AccountId,
    /// ICR at the tick's price, pending rewards included
    pub icr: u128,
    pub coll: u128,
    pub debt: u128,
}

/// Market conditions a tick evaluates every position against
#[derive(Debug, Clone, Copy)]
pub struct SystemView {
    pub mcr: u128,
    pub tcr: u128,
    pub recovery: bool,
    pub stability_deposits: u128,
}

impl SystemView {
    pub fn capture(state: &State, price: u128) -> Result<Self> {
        Ok(Self {
            mcr: state.params().mcr,
            tcr: state.get_tcr(price)?,
            recovery: state.check_recovery_mode(price)?,
            stability_deposits: state.total_deposits(),
        })
    }

    /// Below MCR always; in Recovery Mode also below TCR when the pool can
    /// absorb the whole debt
    pub fn is_liquidatable(&self, health: &PositionHealth) -> bool {
        if health.icr < self.mcr {
            return true;
        }
        self.recovery && health.icr < self.tcr && self.stability_deposits >= health.debt
    }
}

pub fn position_health(state: &State, id: AccountId, price: u128) -> Result<PositionHealth> {
    let entire = state.get_entire_debt_and_coll(id)?;
    Ok(PositionHealth {
        id,
        icr: compute_cr(entire.coll, entire.debt, price),
        coll: entire.coll,
        debt: entire.debt,
    })
}

/// Health of every active position
pub fn scan(state: &State, price: u128) -> Result<Vec<PositionHealth>> {
    state
        .ledger()
        .iter_active()
        .map(|(id, _)| position_health(state, id, price))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballast_core::math::{percent, wad};

    fn health(icr_percent: u128, debt: u128) -> PositionHealth {
        PositionHealth {
            id: AccountId(1),
            icr: percent(icr_percent),
            coll: wad(10),
            debt: wad(debt),
        }
    }

    #[test]
    fn test_normal_mode_uses_mcr_only() {
        let view = SystemView {
            mcr: percent(110),
            tcr: percent(200),
            recovery: false,
            stability_deposits: wad(1_000_000),
        };
        assert!(view.is_liquidatable(&health(105, 2000)));
        assert!(!view.is_liquidatable(&health(130, 2000)));
    }

    #[test]
    fn test_recovery_mode_needs_pool_cover() {
        let mut view = SystemView {
            mcr: percent(110),
            tcr: percent(140),
            recovery: true,
            stability_deposits: wad(5000),
        };
        assert!(view.is_liquidatable(&health(120, 2000)));
        assert!(!view.is_liquidatable(&health(145, 2000)));
        view.stability_deposits = wad(1000);
        assert!(!view.is_liquidatable(&health(120, 2000)));
        assert!(view.is_liquidatable(&health(100, 2000)));
    }
}
