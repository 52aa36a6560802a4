//! Invariant checking helpers
//!
//! These walk every position or deposit, so they are for tests and offline
//! audits of a snapshot, never for the hot path.

use crate::math::add;
use crate::state::pools::{Asset, Pool};
use crate::state::{live_nicr, State};

/// Collateral still held plus what left through the boundary equals what came in
pub fn conservation_ok(s: &State) -> bool {
    let pools = s.pools();
    let held = [Pool::Active, Pool::Default, Pool::Stability, Pool::Surplus]
        .iter()
        .try_fold(0u128, |acc, p| add(acc, pools.balance(*p, Asset::Collateral)));
    let flows = pools.flows();
    let left = add(flows.withdrawn, flows.incentives_paid);
    match (held, left) {
        (Ok(held), Ok(left)) => add(held, left) == Ok(flows.deposited),
        _ => false,
    }
}

/// Positions never claim more collateral or debt than the Active and Default
/// pools hold; the gap is redistribution rounding and stays small
pub fn positions_backed(s: &State, tolerance: u128) -> bool {
    let mut coll = 0u128;
    let mut debt = 0u128;
    for (id, _) in s.ledger().iter_active() {
        let Ok(entire) = s.get_entire_debt_and_coll(id) else {
            return false;
        };
        coll = coll.saturating_add(entire.coll);
        debt = debt.saturating_add(entire.debt);
    }
    let (Ok(system_coll), Ok(system_debt)) = (s.entire_system_coll(), s.entire_system_debt()) else {
        return false;
    };
    coll <= system_coll
        && debt <= system_debt
        && system_coll - coll <= tolerance
        && system_debt - debt <= tolerance
}

/// Sum of compounded deposits and gains never exceeds what the pool holds
pub fn deposits_covered(s: &State) -> bool {
    let stability = s.stability();
    let mut deposits = 0u128;
    let mut gains = 0u128;
    for depositor in stability.depositors() {
        deposits = deposits.saturating_add(stability.compounded_deposit(depositor));
        match stability.collateral_gain(depositor) {
            Ok(gain) => gains = gains.saturating_add(gain),
            Err(_) => return false,
        }
    }
    deposits <= s.total_deposits() && gains <= s.pools().balance(Pool::Stability, Asset::Collateral)
}

/// The index holds exactly the active positions, in non-increasing live NICR order
pub fn index_consistent(s: &State) -> bool {
    if s.index().len() != s.ledger().active_count() {
        return false;
    }
    let mut last = u128::MAX;
    for id in s.index().iter() {
        if !s.ledger().is_active(id) {
            return false;
        }
        let nicr = live_nicr(s.ledger(), s.rewards(), id);
        if nicr > last {
            return false;
        }
        last = nicr;
    }
    true
}
