//! Redeeming stablecoin for collateral at face value
//!
//! Redemptions walk up from the riskiest position that is still at or above
//! MCR, paying down debt one position at a time. A position redeemed down to
//! its reserve is closed and its leftover collateral becomes a surplus claim.
//! A partial redemption that would leave less than the minimum net debt ends
//! the walk.

use super::{require_user_accepts_fee, require_valid_max_fee, Hints};
use crate::error::{EngineError, EngineResult};
use crate::hooks::Transfer;
use crate::math::{add, compute_cr, mul_div, sub, DECIMAL_PRECISION};
use crate::oracle::PriceFeed;
use crate::state::pools::{Asset, Pool};
use crate::state::position::{AccountId, Status};
use crate::state::State;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionOutcome {
    /// Stablecoin actually redeemed, at most the requested amount
    pub stable_redeemed: u128,
    /// Collateral taken from positions, fee included
    pub coll_drawn: u128,
    pub coll_fee: u128,
    pub closed: Vec<AccountId>,
    pub transfers: Vec<Transfer>,
}

struct RedemptionStep {
    id: AccountId,
    stable_lot: u128,
    coll_lot: u128,
    new_debt: u128,
    new_coll: u128,
    closes: bool,
}

impl State {
    #[allow(clippy::too_many_arguments)]
    pub fn redeem_collateral<P: PriceFeed>(
        &mut self,
        redeemer: AccountId,
        amount: u128,
        max_fee_percentage: u128,
        max_iterations: usize,
        hints: Hints,
        feed: &P,
        now: u64,
    ) -> EngineResult<RedemptionOutcome> {
        require_valid_max_fee(max_fee_percentage, self.params.redemption_fee_floor)?;
        let price = feed.current_price()?;
        if self.get_tcr(price)? < self.params.mcr {
            return Err(EngineError::RedemptionBelowMcr);
        }
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        let total_supply = self.total_supply()?;

        let steps = self.plan_redemption(amount, max_iterations, price)?;
        let stable_redeemed = steps.iter().try_fold(0u128, |acc, s| add(acc, s.stable_lot))?;
        let coll_drawn = steps.iter().try_fold(0u128, |acc, s| add(acc, s.coll_lot))?;
        if coll_drawn == 0 {
            return Err(EngineError::UnableToRedeem);
        }
        let closing = steps.iter().filter(|s| s.closes).count();
        if closing >= self.ledger.active_count() {
            return Err(EngineError::LastPosition);
        }

        let mut fees = self.fees;
        let redeemed_value = mul_div(coll_drawn, price, DECIMAL_PRECISION)?;
        fees.record_redemption(redeemed_value, total_supply, now, &self.params)?;
        let coll_fee = fees.redemption_fee(coll_drawn, &self.params)?;
        require_user_accepts_fee(coll_fee, coll_drawn, max_fee_percentage)?;

        self.fees = fees;
        let mut closed = Vec::new();
        for step in &steps {
            self.apply_pending_rewards(step.id)?;
            if step.closes {
                self.close_position(step.id, Status::ClosedByRedemption)?;
                self.pools
                    .withdraw(Pool::Active, Asset::Stable, self.params.liquidation_reserve)?;
                self.pools
                    .transfer(Pool::Active, Pool::Surplus, Asset::Collateral, step.new_coll)?;
                self.pools.account_surplus(step.id, step.new_coll)?;
                closed.push(step.id);
            } else {
                let position = self.ledger.get_active_mut(step.id)?;
                position.debt = step.new_debt;
                position.coll = step.new_coll;
                self.update_stake(step.id)?;
                self.reinsert_into_index(step.id, hints.prev, hints.next)?;
            }
        }

        self.pools.withdraw(Pool::Active, Asset::Stable, stable_redeemed)?;
        let coll_to_redeemer = sub(coll_drawn, coll_fee, "redeemed collateral")?;
        self.pools.collateral_out(Pool::Active, coll_to_redeemer)?;
        self.pools.collateral_out(Pool::Active, coll_fee)?;

        log::info!(
            "{} redeemed {} for {} collateral (fee {}), closed {}",
            redeemer,
            stable_redeemed,
            coll_drawn,
            coll_fee,
            closed.len()
        );

        Ok(RedemptionOutcome {
            stable_redeemed,
            coll_drawn,
            coll_fee,
            closed,
            transfers: vec![
                Transfer::StableFrom {
                    payer: redeemer,
                    amount: stable_redeemed,
                },
                Transfer::CollateralTo {
                    recipient: redeemer,
                    amount: coll_to_redeemer,
                },
                Transfer::CollateralFee { amount: coll_fee },
            ],
        })
    }

    fn plan_redemption(&self, amount: u128, max_iterations: usize, price: u128) -> EngineResult<Vec<RedemptionStep>> {
        let params = &self.params;

        // Positions below MCR are left to liquidation
        let mut current = self.index.worst();
        while let Some(id) = current {
            if self.get_current_icr(id, price)? >= params.mcr {
                break;
            }
            current = self.index.prev(id);
        }

        let mut remaining = amount;
        let mut steps = Vec::new();
        while let Some(id) = current {
            if remaining == 0 || (max_iterations > 0 && steps.len() >= max_iterations) {
                break;
            }
            let entire = self.get_entire_debt_and_coll(id)?;
            let stable_lot = remaining.min(params.net_debt(entire.debt));
            let coll_lot = mul_div(stable_lot, DECIMAL_PRECISION, price)?;
            let new_debt = sub(entire.debt, stable_lot, "position debt")?;
            let new_coll = sub(entire.coll, coll_lot, "position collateral")?;

            let closes = new_debt == params.liquidation_reserve;
            if !closes && params.net_debt(new_debt) < params.min_net_debt {
                break;
            }
            log::debug!(
                "redeeming {} from {} (ICR {})",
                stable_lot,
                id,
                compute_cr(entire.coll, entire.debt, price)
            );
            steps.push(RedemptionStep {
                id,
                stable_lot,
                coll_lot,
                new_debt,
                new_coll,
                closes,
            });
            remaining = sub(remaining, stable_lot, "redemption amount")?;
            current = self.index.prev(id);
        }
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{percent, wad};
    use crate::oracle::FixedPrice;
    use crate::params::ProtocolParams;

    const PRICE: FixedPrice = FixedPrice(wad(200));
    const LATER: u64 = 100 * 24 * 3600;

    fn fee_free_state() -> State {
        let params = ProtocolParams {
            borrowing_fee_floor: 0,
            max_borrowing_fee: 0,
            ..ProtocolParams::default()
        };
        let mut state = State::new(params).unwrap();
        // Debts 2200, 2900, 2900: supply 8000
        for (id, coll, amount) in [(1, wad(20), wad(2000)), (2, wad(30), wad(2700)), (3, wad(40), wad(2700))] {
            state
                .open_position(AccountId(id), coll, amount, 0, Hints::default(), &PRICE, 0)
                .unwrap();
        }
        state
    }

    #[test]
    fn test_full_redemption_closes_worst_position() {
        let mut state = fee_free_state();
        let redeemer = AccountId(9);
        let outcome = state
            .redeem_collateral(redeemer, wad(3200), percent(20), 0, Hints::default(), &PRICE, LATER)
            .unwrap();

        // Position 1 paid down to its reserve; a 1200 lot from position 2 would
        // leave it below the minimum net debt, so the walk stops
        assert_eq!(outcome.stable_redeemed, wad(2000));
        assert_eq!(outcome.coll_drawn, wad(10));
        assert_eq!(outcome.closed, vec![AccountId(1)]);
        assert_eq!(state.ledger().status(AccountId(1)), Status::ClosedByRedemption);
        assert_eq!(state.pools().surplus_of(AccountId(1)), wad(10));

        // 2000 of 8000 redeemed: base rate 12.5%, fee 13% of 10
        assert_eq!(state.fees().base_rate(), percent(125) / 10);
        assert_eq!(outcome.coll_fee, wad(13) / 10);
        assert_eq!(state.entire_system_debt().unwrap(), wad(5800));
        assert_eq!(state.ledger().get(AccountId(2)).unwrap().debt, wad(2900));
        assert_eq!(
            outcome.transfers[1],
            Transfer::CollateralTo {
                recipient: redeemer,
                amount: wad(10) - wad(13) / 10
            }
        );
    }

    #[test]
    fn test_partial_redemption_reinserts() {
        let mut state = fee_free_state();
        let outcome = state
            .redeem_collateral(AccountId(9), wad(100), percent(20), 0, Hints::default(), &PRICE, LATER)
            .unwrap();
        assert!(outcome.closed.is_empty());
        let position = state.ledger().get(AccountId(1)).unwrap();
        assert_eq!(position.debt, wad(2100));
        assert_eq!(position.coll, wad(20) - wad(1) / 2);
        assert_eq!(state.index().worst(), Some(AccountId(1)));
    }

    #[test]
    fn test_redemption_rejects_bad_fee_and_zero() {
        let mut state = fee_free_state();
        assert_eq!(
            state.redeem_collateral(AccountId(9), wad(100), 0, 0, Hints::default(), &PRICE, LATER),
            Err(EngineError::InvalidMaxFee(0))
        );
        assert_eq!(
            state.redeem_collateral(AccountId(9), 0, percent(20), 0, Hints::default(), &PRICE, LATER),
            Err(EngineError::ZeroAmount)
        );
    }
}
