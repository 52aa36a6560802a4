mod common;

use ballast_core::helpers::{conservation_ok, deposits_covered};
use ballast_core::math::wad;
use ballast_core::state::pools::{Asset, Pool};
use ballast_core::state::stability::{StabilityCompounder, P_PRECISION, SCALE_FACTOR};
use ballast_core::{AccountId, Adjustment, EngineError, Hints, LiquidationPath, Transfer, Withdrawal};
use common::{Harness, LIQUIDATOR};
use proptest::prelude::*;

/// A well-collateralized whale plus one victim owing exactly 2000
fn whale_and_victim() -> (Harness, AccountId, AccountId) {
    let mut h = Harness::new();
    let whale = h.open(1, 100, 1800);
    let victim = h.open(2, 11, 1800);
    (h, whale, victim)
}

#[test]
fn test_offset_of_whole_pool_starts_new_epoch() {
    let (mut h, whale, victim) = whale_and_victim();
    h.deposit(whale.0, 2000);

    h.set_price(150);
    let outcome = h.state.liquidate(victim, LIQUIDATOR, &h.feed()).unwrap();
    assert_eq!(outcome.liquidated[0].path, LiquidationPath::FullyOffset);

    assert_eq!(h.state.total_deposits(), 0);
    assert_eq!(h.state.stability().current_epoch(), 1);
    assert_eq!(h.state.get_compounded_deposit(whale), 0);
    let gain = wad(11) - wad(11) / 200;
    assert_eq!(h.state.get_depositor_collateral_gain(whale).unwrap(), gain);

    // The gain survives the epoch change and can go into the whale's position
    h.state.withdraw_gain_to_position(whale, Hints::default()).unwrap();
    assert_eq!(h.state.ledger().get(whale).unwrap().coll, wad(100) + gain);
    assert_eq!(h.state.pools().balance(Pool::Stability, Asset::Collateral), 0);
    // The compounded deposit was zero, so the deposit is gone
    assert_eq!(
        h.state.withdraw_gain_to_position(whale, Hints::default()),
        Err(EngineError::NoDeposit(whale))
    );

    // A fresh deposit starts from a clean product
    let newcomer = h.deposit(60, 500);
    assert_eq!(h.state.get_compounded_deposit(newcomer), wad(500));
    assert_eq!(h.state.stability().p(), P_PRECISION);
    assert!(deposits_covered(&h.state));
    h.check_invariants();
}

#[test]
fn test_gain_withdrawn_after_epoch_change() {
    let (mut h, _whale, victim) = whale_and_victim();
    let depositor = h.deposit(50, 2000);
    h.set_price(150);
    h.state.liquidate(victim, LIQUIDATOR, &h.feed()).unwrap();

    let transfers = h
        .state
        .withdraw_from_pool(depositor, Withdrawal::All, &h.feed())
        .unwrap();
    assert_eq!(
        transfers,
        vec![Transfer::CollateralTo {
            recipient: depositor,
            amount: wad(11) - wad(11) / 200
        }]
    );
    assert!(h.state.stability().deposit_of(depositor).is_none());
    assert!(conservation_ok(&h.state));
}

#[test]
fn test_withdrawal_blocked_while_positions_below_mcr() {
    let (mut h, _whale, _victim) = whale_and_victim();
    let depositor = h.deposit(50, 1000);
    h.set_price(150);

    assert_eq!(
        h.state
            .withdraw_from_pool(depositor, Withdrawal::Amount(wad(100)), &h.feed()),
        Err(EngineError::UndercollateralizedPositions)
    );
    // Claiming only the gain is still allowed
    let transfers = h
        .state
        .withdraw_from_pool(depositor, Withdrawal::Amount(0), &h.feed())
        .unwrap();
    assert!(transfers.is_empty());
    assert_eq!(h.state.get_compounded_deposit(depositor), wad(1000));
}

#[test]
fn test_deposit_top_up_settles_gain_first() {
    let mut h = Harness::new();
    h.open(1, 100, 1800);
    let victim = h.open(2, 11, 1800);
    let depositor = h.deposit(50, 4000);
    h.set_price(150);
    h.state.liquidate(victim, LIQUIDATOR, &h.feed()).unwrap();

    let gain = h.state.get_depositor_collateral_gain(depositor).unwrap();
    assert!(gain > 0);
    let compounded = h.state.get_compounded_deposit(depositor);

    let transfers = h.state.provide_to_pool(depositor, wad(1000)).unwrap();
    assert_eq!(
        transfers,
        vec![
            Transfer::StableFrom {
                payer: depositor,
                amount: wad(1000)
            },
            Transfer::CollateralTo {
                recipient: depositor,
                amount: gain
            },
        ]
    );
    assert_eq!(h.state.get_depositor_collateral_gain(depositor).unwrap(), 0);
    assert_eq!(h.state.get_compounded_deposit(depositor), compounded + wad(1000));
    assert!(deposits_covered(&h.state));
}

#[derive(Clone, Debug)]
enum PoolOp {
    Deposit(u64, u128),
    /// Absorb `k / 1_000_000` of the pool
    Offset(u128, u128),
    /// Absorb all but a few wei of the pool
    Drain(u128, u128),
}

fn pool_op() -> impl Strategy<Value = PoolOp> {
    prop_oneof![
        (0u64..5, 1u128..1_000_000).prop_map(|(d, units)| PoolOp::Deposit(d, wad(units))),
        (1u128..1_000_000, 0u128..1_000).prop_map(|(k, coll)| PoolOp::Offset(k, wad(coll))),
        (1u128..1_000, 0u128..1_000).prop_map(|(left, coll)| PoolOp::Drain(left, wad(coll))),
    ]
}

/// Ids used both as borrowers and as depositors in the random sequences
const ACTORS: std::ops::Range<u64> = 200..206;

#[derive(Clone, Debug)]
enum EngineOp {
    Deposit(u64, u128),
    Liquidate,
    Open(u64, u128, u128),
    Adjust(u64, Adjustment),
    Close(u64),
    Withdraw(u64, u128),
    GainToPosition(u64),
    Redeem(u128),
}

fn adjustment() -> impl Strategy<Value = Adjustment> {
    prop_oneof![
        (1u128..20).prop_map(|u| Adjustment { coll_deposit: wad(u), ..Adjustment::default() }),
        (1u128..20).prop_map(|u| Adjustment { coll_withdrawal: wad(u), ..Adjustment::default() }),
        (100u128..1000).prop_map(|u| Adjustment { debt_increase: wad(u), ..Adjustment::default() }),
        (100u128..1000).prop_map(|u| Adjustment { debt_repayment: wad(u), ..Adjustment::default() }),
    ]
}

fn engine_op() -> impl Strategy<Value = EngineOp> {
    prop_oneof![
        (ACTORS, 100u128..3000).prop_map(|(d, units)| EngineOp::Deposit(d, units)),
        Just(EngineOp::Liquidate),
        (ACTORS, 25u128..60, 1800u128..2500).prop_map(|(id, coll, amount)| EngineOp::Open(id, coll, amount)),
        (ACTORS, adjustment()).prop_map(|(id, adj)| EngineOp::Adjust(id, adj)),
        ACTORS.prop_map(EngineOp::Close),
        (ACTORS, 0u128..2000).prop_map(|(d, units)| EngineOp::Withdraw(d, units)),
        ACTORS.prop_map(EngineOp::GainToPosition),
        (100u128..1500).prop_map(EngineOp::Redeem),
    ]
}

/// Run one operation; a rejected operation must leave the state as it was
fn run_engine_op(h: &mut Harness, op: EngineOp) -> Result<(), TestCaseError> {
    let before = h.state.clone();
    let feed = h.feed();
    let result = match op {
        EngineOp::Deposit(d, units) => h.state.provide_to_pool(AccountId(d), wad(units)).map(drop),
        EngineOp::Liquidate => h.state.liquidate_worst_n(1, LIQUIDATOR, &feed).map(drop),
        EngineOp::Open(id, coll, amount) => h
            .state
            .open_position(AccountId(id), wad(coll), wad(amount), wad(1), Hints::default(), &feed, h.now)
            .map(drop),
        EngineOp::Adjust(id, adj) => h
            .state
            .adjust_position(AccountId(id), adj, wad(1), Hints::default(), &feed, h.now)
            .map(drop),
        EngineOp::Close(id) => h.state.close_position_by_owner(AccountId(id), &feed).map(drop),
        EngineOp::Withdraw(d, units) => h
            .state
            .withdraw_from_pool(AccountId(d), Withdrawal::Amount(wad(units)), &feed)
            .map(drop),
        EngineOp::GainToPosition(d) => h.state.withdraw_gain_to_position(AccountId(d), Hints::default()),
        EngineOp::Redeem(units) => h
            .state
            .redeem_collateral(AccountId(500), wad(units), wad(1), 10, Hints::default(), &feed, h.now)
            .map(drop),
    };
    if let Err(e) = result {
        prop_assert!(!e.is_fatal(), "arithmetic guard tripped: {}", e);
        prop_assert!(h.state == before, "rejected operation changed state: {}", e);
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_offsets_keep_product_above_floor(ops in prop::collection::vec(pool_op(), 1..60)) {
        let mut sp = StabilityCompounder::new();
        let mut total = 0u128;

        for op in ops {
            match op {
                PoolOp::Deposit(d, amount) => {
                    let id = AccountId(d);
                    prop_assert!(sp.collateral_gain(id).is_ok());
                    let compounded = sp.compounded_deposit(id);
                    sp.update_deposit(id, compounded + amount);
                    total += amount;
                }
                PoolOp::Offset(k, coll) => {
                    let debt = total * k / 1_000_000;
                    if debt == 0 {
                        continue;
                    }
                    sp.offset(debt, coll, total).unwrap();
                    total -= debt;
                }
                PoolOp::Drain(left, coll) => {
                    if total <= left {
                        continue;
                    }
                    let scale = sp.current_scale();
                    sp.offset(total - left, coll, total).unwrap();
                    total = left;
                    prop_assert!(sp.current_scale() <= scale + 1);
                }
            }

            prop_assert!(sp.p() >= SCALE_FACTOR);
            prop_assert!(sp.p() <= P_PRECISION);
            let mut sum = 0u128;
            for id in sp.depositors().collect::<Vec<_>>() {
                let compounded = sp.compounded_deposit(id);
                let initial = sp.deposit_of(id).map(|d| d.initial_value).unwrap_or(0);
                prop_assert!(compounded <= initial);
                sum += compounded;
            }
            prop_assert!(sum <= total + 1_000, "deposits {} exceed pool {}", sum, total);
        }
    }

    #[test]
    fn prop_all_depositors_can_withdraw(
        victims in prop::collection::vec(11u128..=15, 6..=10),
        ops in prop::collection::vec(engine_op(), 5..40),
    ) {
        let mut h = Harness::new();
        h.open(1, 2000, 50_000);
        for (i, coll) in victims.iter().enumerate() {
            h.open(i as u64 + 2, *coll, 1800);
        }
        // Every victim is now under 100%, the whale keeps the system in Normal Mode
        h.set_price(100);

        for op in ops {
            run_engine_op(&mut h, op)?;
            h.now += 120;
            h.check_invariants();
            prop_assert!(deposits_covered(&h.state));
        }

        for _ in 0..40 {
            match h.state.liquidate_worst_n(20, LIQUIDATOR, &h.feed()) {
                Ok(_) => {}
                Err(EngineError::NothingToLiquidate) => break,
                Err(e) => prop_assert!(false, "liquidation failed: {}", e),
            }
        }
        prop_assert!(!h.state.has_undercollateralized_positions(h.price).unwrap());
        prop_assert!(h.state.ledger().is_active(AccountId(1)));
        prop_assert!(deposits_covered(&h.state));
        h.check_invariants();

        let depositors: Vec<AccountId> = h.state.stability().depositors().collect();
        for depositor in depositors {
            let result = h.state.withdraw_from_pool(depositor, Withdrawal::All, &h.feed());
            prop_assert!(result.is_ok(), "{} could not withdraw: {:?}", depositor, result);
            prop_assert_eq!(h.state.get_compounded_deposit(depositor), 0);
            prop_assert_eq!(h.state.get_depositor_collateral_gain(depositor).unwrap(), 0);
        }
        prop_assert!(conservation_ok(&h.state));
    }
}
