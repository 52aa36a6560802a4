//! Opening, adjusting and closing positions

use super::{require_user_accepts_fee, require_valid_max_fee, Hints, SystemChange};
use crate::error::{EngineError, EngineResult};
use crate::hooks::Transfer;
use crate::math::{add, compute_cr, sub};
use crate::oracle::PriceFeed;
use crate::state::pools::{Asset, Pool};
use crate::state::position::{AccountId, Status};
use crate::state::State;

/// Requested change to a position; at most one side of each pair may be set
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Adjustment {
    pub coll_deposit: u128,
    pub coll_withdrawal: u128,
    pub debt_increase: u128,
    pub debt_repayment: u128,
}

impl State {
    /// Open a position with `coll` collateral, drawing `amount` of stablecoin.
    ///
    /// Stored debt is `amount + fee + liquidation reserve`.
    pub fn open_position<P: PriceFeed>(
        &mut self,
        owner: AccountId,
        coll: u128,
        amount: u128,
        max_fee_percentage: u128,
        hints: Hints,
        feed: &P,
        now: u64,
    ) -> EngineResult<Vec<Transfer>> {
        let price = feed.current_price()?;
        let recovery = self.check_recovery_mode(price)?;
        if recovery {
            require_valid_max_fee(max_fee_percentage, 0)?;
        } else {
            require_valid_max_fee(max_fee_percentage, self.params.borrowing_fee_floor)?;
        }
        if self.ledger.is_active(owner) {
            return Err(EngineError::PositionAlreadyActive(owner));
        }
        if self.index.is_full() {
            return Err(EngineError::IndexFull);
        }

        let mut fees = self.fees;
        let fee = if recovery {
            0
        } else {
            let supply_after = add(add(self.total_supply()?, amount)?, self.params.liquidation_reserve)?;
            let fee = fees.record_issuance(amount, supply_after, now, &self.params)?;
            require_user_accepts_fee(fee, amount, max_fee_percentage)?;
            fee
        };

        let net_debt = add(amount, fee)?;
        if net_debt < self.params.min_net_debt {
            return Err(EngineError::NetDebtTooSmall {
                net_debt,
                minimum: self.params.min_net_debt,
            });
        }
        let debt = self.params.gross_debt(net_debt)?;
        let icr = compute_cr(coll, debt, price);
        if recovery {
            if icr < self.params.ccr {
                return Err(EngineError::CollateralRatioTooLow {
                    icr,
                    required: self.params.ccr,
                });
            }
        } else {
            if icr < self.params.mcr {
                return Err(EngineError::CollateralRatioTooLow {
                    icr,
                    required: self.params.mcr,
                });
            }
            let change = SystemChange {
                coll_added: coll,
                debt_added: debt,
                ..SystemChange::default()
            };
            if self.tcr_after(change, price)? < self.params.ccr {
                return Err(EngineError::TcrBelowCritical);
            }
        }

        let stake = self.rewards.compute_stake(coll)?;
        self.fees = fees;
        self.ledger
            .activate(owner, coll, debt, stake, self.rewards.snapshot())?;
        self.insert_into_index(owner, hints.prev, hints.next)?;
        self.pools.collateral_in(Pool::Active, coll)?;
        self.pools.deposit(Pool::Active, Asset::Stable, debt)?;

        log::info!("{} opened position: coll {} debt {} fee {}", owner, coll, debt, fee);

        let mut transfers = vec![Transfer::StableTo {
            recipient: owner,
            amount,
        }];
        if fee > 0 {
            transfers.push(Transfer::StableFee { amount: fee });
        }
        Ok(transfers)
    }

    pub fn adjust_position<P: PriceFeed>(
        &mut self,
        owner: AccountId,
        adjustment: Adjustment,
        max_fee_percentage: u128,
        hints: Hints,
        feed: &P,
        now: u64,
    ) -> EngineResult<Vec<Transfer>> {
        let Adjustment {
            coll_deposit,
            coll_withdrawal,
            debt_increase,
            debt_repayment,
        } = adjustment;
        let price = feed.current_price()?;
        let recovery = self.check_recovery_mode(price)?;

        if debt_increase > 0 {
            let floor = if recovery { 0 } else { self.params.borrowing_fee_floor };
            require_valid_max_fee(max_fee_percentage, floor)?;
        }
        if coll_deposit > 0 && coll_withdrawal > 0 {
            return Err(EngineError::InvalidParams("collateral deposit and withdrawal in one adjustment"));
        }
        if debt_increase > 0 && debt_repayment > 0 {
            return Err(EngineError::InvalidParams("debt increase and repayment in one adjustment"));
        }
        if adjustment == Adjustment::default() {
            return Err(EngineError::ZeroAmount);
        }
        let entire = self.get_entire_debt_and_coll(owner)?;
        if recovery && coll_withdrawal > 0 {
            return Err(EngineError::NotPermittedInRecoveryMode);
        }

        let mut fees = self.fees;
        let fee = if debt_increase > 0 && !recovery {
            let supply_after = add(self.total_supply()?, debt_increase)?;
            let fee = fees.record_issuance(debt_increase, supply_after, now, &self.params)?;
            require_user_accepts_fee(fee, debt_increase, max_fee_percentage)?;
            fee
        } else {
            0
        };
        let debt_added = add(debt_increase, fee)?;

        if coll_withdrawal > entire.coll {
            return Err(EngineError::WithdrawalTooLarge {
                withdraw: coll_withdrawal,
                available: entire.coll,
            });
        }
        let repayable = self.params.net_debt(entire.debt);
        if debt_repayment > repayable {
            return Err(EngineError::RepaymentTooLarge {
                repay: debt_repayment,
                available: repayable,
            });
        }

        let new_coll = sub(add(entire.coll, coll_deposit)?, coll_withdrawal, "position collateral")?;
        let new_debt = sub(add(entire.debt, debt_added)?, debt_repayment, "position debt")?;
        let old_icr = compute_cr(entire.coll, entire.debt, price);
        let new_icr = compute_cr(new_coll, new_debt, price);

        if recovery {
            if debt_increase > 0 {
                if new_icr < self.params.ccr {
                    return Err(EngineError::CollateralRatioTooLow {
                        icr: new_icr,
                        required: self.params.ccr,
                    });
                }
                if new_icr < old_icr {
                    return Err(EngineError::CollateralRatioTooLow {
                        icr: new_icr,
                        required: old_icr,
                    });
                }
            }
        } else {
            if new_icr < self.params.mcr {
                return Err(EngineError::CollateralRatioTooLow {
                    icr: new_icr,
                    required: self.params.mcr,
                });
            }
            let change = SystemChange {
                coll_added: coll_deposit,
                coll_removed: coll_withdrawal,
                debt_added,
                debt_removed: debt_repayment,
            };
            if self.tcr_after(change, price)? < self.params.ccr {
                return Err(EngineError::TcrBelowCritical);
            }
        }
        if debt_repayment > 0 {
            let net_debt = self.params.net_debt(new_debt);
            if net_debt < self.params.min_net_debt {
                return Err(EngineError::NetDebtTooSmall {
                    net_debt,
                    minimum: self.params.min_net_debt,
                });
            }
        }

        self.fees = fees;
        self.apply_pending_rewards(owner)?;
        let position = self.ledger.get_active_mut(owner)?;
        position.coll = new_coll;
        position.debt = new_debt;
        self.update_stake(owner)?;
        self.reinsert_into_index(owner, hints.prev, hints.next)?;

        self.pools.collateral_in(Pool::Active, coll_deposit)?;
        self.pools.collateral_out(Pool::Active, coll_withdrawal)?;
        self.pools.deposit(Pool::Active, Asset::Stable, debt_added)?;
        self.pools.withdraw(Pool::Active, Asset::Stable, debt_repayment)?;

        log::debug!("{} adjusted position: coll {} debt {}", owner, new_coll, new_debt);

        let mut transfers = Vec::new();
        if coll_withdrawal > 0 {
            transfers.push(Transfer::CollateralTo {
                recipient: owner,
                amount: coll_withdrawal,
            });
        }
        if debt_increase > 0 {
            transfers.push(Transfer::StableTo {
                recipient: owner,
                amount: debt_increase,
            });
        }
        if fee > 0 {
            transfers.push(Transfer::StableFee { amount: fee });
        }
        if debt_repayment > 0 {
            transfers.push(Transfer::StableFrom {
                payer: owner,
                amount: debt_repayment,
            });
        }
        Ok(transfers)
    }

    /// Repay the net debt and take back all collateral. The reserve is burned.
    pub fn close_position_by_owner<P: PriceFeed>(&mut self, owner: AccountId, feed: &P) -> EngineResult<Vec<Transfer>> {
        let price = feed.current_price()?;
        let entire = self.get_entire_debt_and_coll(owner)?;
        if self.check_recovery_mode(price)? {
            return Err(EngineError::NotPermittedInRecoveryMode);
        }
        self.require_not_last()?;
        let change = SystemChange {
            coll_removed: entire.coll,
            debt_removed: entire.debt,
            ..SystemChange::default()
        };
        if self.tcr_after(change, price)? < self.params.ccr {
            return Err(EngineError::TcrBelowCritical);
        }

        self.apply_pending_rewards(owner)?;
        self.close_position(owner, Status::ClosedByOwner)?;
        self.pools.withdraw(Pool::Active, Asset::Stable, entire.debt)?;
        self.pools.collateral_out(Pool::Active, entire.coll)?;

        log::info!("{} closed position, returned coll {}", owner, entire.coll);
        Ok(vec![
            Transfer::StableFrom {
                payer: owner,
                amount: self.params.net_debt(entire.debt),
            },
            Transfer::CollateralTo {
                recipient: owner,
                amount: entire.coll,
            },
        ])
    }

    pub fn claim_collateral_surplus(&mut self, owner: AccountId) -> EngineResult<Vec<Transfer>> {
        let amount = self.pools.claim_surplus(owner)?;
        Ok(vec![Transfer::CollateralTo {
            recipient: owner,
            amount,
        }])
    }
}
