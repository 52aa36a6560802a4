//! Stability Pool deposits and withdrawals
//!
//! A deposit is always settled before its principal changes: the accrued
//! collateral gain is paid out and a fresh snapshot is taken at the
//! compounded value.

use super::Hints;
use crate::error::{EngineError, EngineResult};
use crate::hooks::Transfer;
use crate::math::{add, sub};
use crate::oracle::PriceFeed;
use crate::state::pools::{Asset, Pool};
use crate::state::position::AccountId;
use crate::state::State;

/// How much to take out of a deposit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Withdrawal {
    /// Up to this amount, clamped to the compounded deposit
    Amount(u128),
    /// The whole compounded deposit
    All,
}

impl State {
    pub fn provide_to_pool(&mut self, depositor: AccountId, amount: u128) -> EngineResult<Vec<Transfer>> {
        if amount == 0 {
            return Err(EngineError::ZeroAmount);
        }
        let gain = self.stability.collateral_gain(depositor)?;
        let compounded = self.stability.compounded_deposit(depositor);
        let new_deposit = add(compounded, amount)?;
        sub(self.pools.balance(Pool::Stability, Asset::Collateral), gain, "stability pool")?;

        self.pools.deposit(Pool::Stability, Asset::Stable, amount)?;
        self.stability.update_deposit(depositor, new_deposit);
        let mut transfers = vec![Transfer::StableFrom {
            payer: depositor,
            amount,
        }];
        self.pay_depositor_gain(depositor, gain, &mut transfers)?;

        log::debug!("{} deposited {}, deposit now {}", depositor, amount, new_deposit);
        Ok(transfers)
    }

    /// Withdraw stablecoin and the accrued collateral gain.
    ///
    /// `Amount(0)` only claims the gain, and is allowed while positions are
    /// below MCR; anything else is not.
    pub fn withdraw_from_pool<P: PriceFeed>(
        &mut self,
        depositor: AccountId,
        withdrawal: Withdrawal,
        feed: &P,
    ) -> EngineResult<Vec<Transfer>> {
        let deposit = self
            .stability
            .deposit_of(depositor)
            .ok_or(EngineError::NoDeposit(depositor))?;
        if deposit.initial_value == 0 {
            return Err(EngineError::NoDeposit(depositor));
        }
        if withdrawal != Withdrawal::Amount(0) {
            let price = feed.current_price()?;
            if self.has_undercollateralized_positions(price)? {
                return Err(EngineError::UndercollateralizedPositions);
            }
        }

        let gain = self.stability.collateral_gain(depositor)?;
        let compounded = self.stability.compounded_deposit(depositor);
        let to_withdraw = match withdrawal {
            Withdrawal::Amount(amount) => amount.min(compounded),
            Withdrawal::All => compounded,
        };
        let remaining = sub(compounded, to_withdraw, "deposit")?;
        sub(self.total_deposits(), to_withdraw, "stability pool deposits")?;
        sub(self.pools.balance(Pool::Stability, Asset::Collateral), gain, "stability pool")?;

        self.pools.withdraw(Pool::Stability, Asset::Stable, to_withdraw)?;
        self.stability.update_deposit(depositor, remaining);
        let mut transfers = Vec::new();
        if to_withdraw > 0 {
            transfers.push(Transfer::StableTo {
                recipient: depositor,
                amount: to_withdraw,
            });
        }
        self.pay_depositor_gain(depositor, gain, &mut transfers)?;

        log::debug!("{} withdrew {} and gain {}, deposit now {}", depositor, to_withdraw, gain, remaining);
        Ok(transfers)
    }

    /// Move the depositor's collateral gain into their own open position
    pub fn withdraw_gain_to_position(&mut self, depositor: AccountId, hints: Hints) -> EngineResult<()> {
        let deposit = self
            .stability
            .deposit_of(depositor)
            .ok_or(EngineError::NoDeposit(depositor))?;
        if deposit.initial_value == 0 {
            return Err(EngineError::NoDeposit(depositor));
        }
        self.require_active(depositor)?;
        let gain = self.stability.collateral_gain(depositor)?;
        if gain == 0 {
            return Err(EngineError::ZeroAmount);
        }
        let compounded = self.stability.compounded_deposit(depositor);
        sub(self.pools.balance(Pool::Stability, Asset::Collateral), gain, "stability pool")?;

        self.stability.update_deposit(depositor, compounded);
        self.apply_pending_rewards(depositor)?;
        self.pools
            .transfer(Pool::Stability, Pool::Active, Asset::Collateral, gain)?;
        let position = self.ledger.get_active_mut(depositor)?;
        position.coll = add(position.coll, gain)?;
        self.update_stake(depositor)?;
        self.reinsert_into_index(depositor, hints.prev, hints.next)?;

        log::debug!("{} moved gain {} into their position", depositor, gain);
        Ok(())
    }

    fn pay_depositor_gain(&mut self, depositor: AccountId, gain: u128, transfers: &mut Vec<Transfer>) -> EngineResult<()> {
        if gain == 0 {
            return Ok(());
        }
        self.pools.collateral_out(Pool::Stability, gain)?;
        transfers.push(Transfer::CollateralTo {
            recipient: depositor,
            amount: gain,
        });
        Ok(())
    }
}
