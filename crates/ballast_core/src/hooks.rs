//! Token movements produced by engine mutations
//!
//! The engine never moves tokens itself. Every mutating entry point commits
//! its state changes first and returns the transfers it owes; the host then
//! hands them to a [`TransferSink`].
//!
//! The liquidation reserve is minted with the debt and held by the host. It
//! goes to the liquidator on liquidation and is burned on close or full
//! redemption, so only the liquidator payout shows up as a transfer.

use crate::state::position::AccountId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transfer {
    /// Pay collateral out of the system
    CollateralTo { recipient: AccountId, amount: u128 },
    /// Mint or release stablecoin to an account
    StableTo { recipient: AccountId, amount: u128 },
    /// Burn or escrow stablecoin taken from an account
    StableFrom { payer: AccountId, amount: u128 },
    /// Borrowing fee, minted to the protocol's fee recipient
    StableFee { amount: u128 },
    /// Redemption fee, paid out to the protocol's fee recipient
    CollateralFee { amount: u128 },
}

pub trait TransferSink {
    fn transfer(&mut self, transfer: &Transfer);
}

/// Collects transfers in order, for hosts that settle later and for tests
impl TransferSink for Vec<Transfer> {
    fn transfer(&mut self, transfer: &Transfer) {
        self.push(*transfer);
    }
}

pub fn dispatch_all<S: TransferSink + ?Sized>(sink: &mut S, transfers: &[Transfer]) {
    for transfer in transfers {
        sink.transfer(transfer);
    }
}

/// Total collateral paid to `recipient` by a list of transfers
pub fn collateral_paid_to(transfers: &[Transfer], recipient: AccountId) -> u128 {
    transfers
        .iter()
        .map(|t| match t {
            Transfer::CollateralTo { recipient: r, amount } if *r == recipient => *amount,
            _ => 0,
        })
        .sum()
}

/// Total stablecoin paid to `recipient` by a list of transfers
pub fn stable_paid_to(transfers: &[Transfer], recipient: AccountId) -> u128 {
    transfers
        .iter()
        .map(|t| match t {
            Transfer::StableTo { recipient: r, amount } if *r == recipient => *amount,
            _ => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_and_totals() {
        let a = AccountId(1);
        let transfers = [
            Transfer::CollateralTo { recipient: a, amount: 5 },
            Transfer::StableTo { recipient: a, amount: 200 },
            Transfer::CollateralTo { recipient: AccountId(2), amount: 7 },
            Transfer::CollateralTo { recipient: a, amount: 1 },
        ];
        let mut sink: Vec<Transfer> = Vec::new();
        dispatch_all(&mut sink, &transfers);
        assert_eq!(sink.len(), 4);
        assert_eq!(collateral_paid_to(&sink, a), 6);
        assert_eq!(stable_paid_to(&sink, a), 200);
    }
}
