//! Shared fixture for the integration tests

#![allow(dead_code)]

use ballast_core::helpers::{conservation_ok, index_consistent, positions_backed};
use ballast_core::math::wad;
use ballast_core::{AccountId, FixedPrice, Hints, ProtocolParams, State};

pub const LIQUIDATOR: AccountId = AccountId(999);

/// Default parameters with the borrowing fee switched off, so stored debt is
/// exactly `amount + 200`
pub fn fee_free_params() -> ProtocolParams {
    ProtocolParams {
        borrowing_fee_floor: 0,
        max_borrowing_fee: 0,
        ..ProtocolParams::default()
    }
}

pub struct Harness {
    pub state: State,
    pub price: u128,
    pub now: u64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_params(fee_free_params())
    }

    pub fn with_params(params: ProtocolParams) -> Self {
        Self {
            state: State::new(params).unwrap(),
            price: wad(200),
            now: 0,
        }
    }

    pub fn feed(&self) -> FixedPrice {
        FixedPrice(self.price)
    }

    pub fn set_price(&mut self, units: u128) {
        self.price = wad(units);
    }

    /// Open a position drawing `amount` whole units against `coll` whole units
    pub fn open(&mut self, id: u64, coll: u128, amount: u128) -> AccountId {
        let owner = AccountId(id);
        let feed = self.feed();
        self.state
            .open_position(owner, wad(coll), wad(amount), wad(1), Hints::default(), &feed, self.now)
            .unwrap();
        owner
    }

    pub fn deposit(&mut self, id: u64, amount: u128) -> AccountId {
        let depositor = AccountId(id);
        self.state.provide_to_pool(depositor, wad(amount)).unwrap();
        depositor
    }

    pub fn check_invariants(&self) {
        assert!(conservation_ok(&self.state), "collateral not conserved");
        assert!(positions_backed(&self.state, 1_000_000), "positions not backed by pools");
        assert!(index_consistent(&self.state), "sorted index out of order");
    }
}

pub fn assert_close(actual: u128, expected: u128, tolerance: u128) {
    let diff = actual.abs_diff(expected);
    assert!(
        diff <= tolerance,
        "{} not within {} of {} (diff {})",
        actual,
        tolerance,
        expected,
        diff
    );
}
