//! Engine state aggregate and read-only views
//!
//! [`State`] owns every ledger, pool and accumulator. Mutating entry points
//! live in `liquidation` and `transitions`; this module holds the reads they
//! share and the small building blocks (reward application, stake refresh,
//! index maintenance) every mutation goes through.

pub mod fees;
pub mod pools;
pub mod position;
pub mod rewards;
pub mod sorted;
pub mod stability;

use crate::error::{EngineError, EngineResult};
use crate::math::{add, compute_cr, compute_nominal_cr, sub};
use crate::params::ProtocolParams;
use fees::FeeClock;
use pools::{Asset, Pool, Pools};
use position::{AccountId, Position, PositionLedger, Status};
use rewards::RewardAccumulator;
use serde::{Deserialize, Serialize};
use sorted::SortedPositions;
use stability::StabilityCompounder;

/// A position's recorded amounts plus what it is owed from redistributions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntireDebtAndColl {
    pub debt: u128,
    pub coll: u128,
    pub pending_debt: u128,
    pub pending_coll: u128,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub(crate) params: ProtocolParams,
    pub(crate) ledger: PositionLedger,
    pub(crate) index: SortedPositions,
    pub(crate) pools: Pools,
    pub(crate) rewards: RewardAccumulator,
    pub(crate) stability: StabilityCompounder,
    pub(crate) fees: FeeClock,
}

/// Nominal ratio of a position with its pending rewards folded in; 0 if inactive
pub(crate) fn live_nicr(ledger: &PositionLedger, rewards: &RewardAccumulator, id: AccountId) -> u128 {
    let Some(position) = ledger.get(id).filter(|p| p.is_active()) else {
        return 0;
    };
    let (pending_coll, pending_debt) = rewards.pending_rewards(position).unwrap_or_default();
    compute_nominal_cr(
        position.coll.saturating_add(pending_coll),
        position.debt.saturating_add(pending_debt),
    )
}

impl State {
    pub fn new(params: ProtocolParams) -> EngineResult<Self> {
        params.validate()?;
        Ok(Self {
            index: SortedPositions::new(params.max_positions),
            params,
            ledger: PositionLedger::new(),
            pools: Pools::new(),
            rewards: RewardAccumulator::new(),
            stability: StabilityCompounder::new(),
            fees: FeeClock::default(),
        })
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn index(&self) -> &SortedPositions {
        &self.index
    }

    pub fn pools(&self) -> &Pools {
        &self.pools
    }

    pub fn rewards(&self) -> &RewardAccumulator {
        &self.rewards
    }

    pub fn stability(&self) -> &StabilityCompounder {
        &self.stability
    }

    pub fn fees(&self) -> &FeeClock {
        &self.fees
    }

    // System totals

    pub fn entire_system_coll(&self) -> EngineResult<u128> {
        add(
            self.pools.balance(Pool::Active, Asset::Collateral),
            self.pools.balance(Pool::Default, Asset::Collateral),
        )
    }

    pub fn entire_system_debt(&self) -> EngineResult<u128> {
        add(
            self.pools.balance(Pool::Active, Asset::Stable),
            self.pools.balance(Pool::Default, Asset::Stable),
        )
    }

    /// Stablecoin in circulation. Every unit was issued as debt, so this is the system debt.
    pub fn total_supply(&self) -> EngineResult<u128> {
        self.entire_system_debt()
    }

    pub fn total_deposits(&self) -> u128 {
        self.pools.balance(Pool::Stability, Asset::Stable)
    }

    pub fn get_tcr(&self, price: u128) -> EngineResult<u128> {
        Ok(compute_cr(self.entire_system_coll()?, self.entire_system_debt()?, price))
    }

    pub fn check_recovery_mode(&self, price: u128) -> EngineResult<bool> {
        Ok(self.get_tcr(price)? < self.params.ccr)
    }

    // Position views

    pub fn pending_collateral_reward(&self, id: AccountId) -> EngineResult<u128> {
        match self.ledger.get(id) {
            Some(p) if p.is_active() => Ok(self.rewards.pending_rewards(p)?.0),
            _ => Ok(0),
        }
    }

    pub fn pending_debt_reward(&self, id: AccountId) -> EngineResult<u128> {
        match self.ledger.get(id) {
            Some(p) if p.is_active() => Ok(self.rewards.pending_rewards(p)?.1),
            _ => Ok(0),
        }
    }

    /// Debt and collateral including pending rewards
    pub fn get_entire_debt_and_coll(&self, id: AccountId) -> EngineResult<EntireDebtAndColl> {
        let position = self.ledger.get_active(id)?;
        let (pending_coll, pending_debt) = self.rewards.pending_rewards(position)?;
        Ok(EntireDebtAndColl {
            debt: add(position.debt, pending_debt)?,
            coll: add(position.coll, pending_coll)?,
            pending_debt,
            pending_coll,
        })
    }

    pub fn get_current_icr(&self, id: AccountId, price: u128) -> EngineResult<u128> {
        let entire = self.get_entire_debt_and_coll(id)?;
        Ok(compute_cr(entire.coll, entire.debt, price))
    }

    pub fn get_nominal_icr(&self, id: AccountId) -> EngineResult<u128> {
        let entire = self.get_entire_debt_and_coll(id)?;
        Ok(compute_nominal_cr(entire.coll, entire.debt))
    }

    // Stability Pool views

    pub fn get_compounded_deposit(&self, depositor: AccountId) -> u128 {
        self.stability.compounded_deposit(depositor)
    }

    pub fn get_depositor_collateral_gain(&self, depositor: AccountId) -> EngineResult<u128> {
        self.stability.collateral_gain(depositor)
    }

    /// Whether the worst position in the index is below MCR
    pub fn has_undercollateralized_positions(&self, price: u128) -> EngineResult<bool> {
        match self.index.worst() {
            Some(worst) => Ok(self.get_current_icr(worst, price)? < self.params.mcr),
            None => Ok(false),
        }
    }

    // Building blocks for mutations

    /// Fold a position's pending redistribution rewards into it.
    ///
    /// A no-op for inactive positions and positions already up to date, so it
    /// is safe to call before any read or write of a position.
    pub fn apply_pending_rewards(&mut self, id: AccountId) -> EngineResult<()> {
        let Some(position) = self.ledger.get(id).filter(|p| p.is_active()) else {
            return Ok(());
        };
        if !self.rewards.has_pending_rewards(position) {
            return Ok(());
        }

        let (pending_coll, pending_debt) = self.rewards.pending_rewards(position)?;
        let new_coll = add(position.coll, pending_coll)?;
        let new_debt = add(position.debt, pending_debt)?;
        sub(self.pools.balance(Pool::Default, Asset::Collateral), pending_coll, "default pool")?;
        sub(self.pools.balance(Pool::Default, Asset::Stable), pending_debt, "default pool")?;

        self.pools.transfer(Pool::Default, Pool::Active, Asset::Collateral, pending_coll)?;
        self.pools.transfer(Pool::Default, Pool::Active, Asset::Stable, pending_debt)?;
        let snapshot = self.rewards.snapshot();
        let position = self.ledger.get_active_mut(id)?;
        position.coll = new_coll;
        position.debt = new_debt;
        position.snapshot = snapshot;

        log::debug!(
            "applied pending rewards to {}: coll +{} debt +{}",
            id,
            pending_coll,
            pending_debt
        );
        Ok(())
    }

    /// Re-derive a position's stake from its collateral at the current snapshot ratio
    pub(crate) fn update_stake(&mut self, id: AccountId) -> EngineResult<u128> {
        let coll = self.ledger.get_active(id)?.coll;
        let stake = self.rewards.compute_stake(coll)?;
        self.ledger.set_stake(id, stake)?;
        Ok(stake)
    }

    pub(crate) fn insert_into_index(
        &mut self,
        id: AccountId,
        prev_hint: Option<AccountId>,
        next_hint: Option<AccountId>,
    ) -> EngineResult<()> {
        let (ledger, rewards) = (&self.ledger, &self.rewards);
        let nicr = live_nicr(ledger, rewards, id);
        self.index
            .insert(id, nicr, prev_hint, next_hint, |k| live_nicr(ledger, rewards, k))
    }

    pub(crate) fn reinsert_into_index(
        &mut self,
        id: AccountId,
        prev_hint: Option<AccountId>,
        next_hint: Option<AccountId>,
    ) -> EngineResult<()> {
        let (ledger, rewards) = (&self.ledger, &self.rewards);
        let nicr = live_nicr(ledger, rewards, id);
        self.index
            .reinsert(id, nicr, prev_hint, next_hint, |k| live_nicr(ledger, rewards, k))
    }

    /// Take a position out of the index and the ledger
    pub(crate) fn close_position(&mut self, id: AccountId, status: Status) -> EngineResult<Position> {
        self.ledger.get_active(id)?;
        self.index.remove(id)?;
        self.ledger.close(id, status)
    }

    /// Record the stake/collateral ratio new stakes are issued at
    pub(crate) fn refresh_stake_snapshots(&mut self) -> EngineResult<()> {
        let total_collateral = self.entire_system_coll()?;
        self.rewards
            .update_stake_snapshots(self.ledger.total_stakes(), total_collateral);
        Ok(())
    }

    pub(crate) fn require_active(&self, id: AccountId) -> EngineResult<&Position> {
        self.ledger.get_active(id)
    }

    pub(crate) fn require_not_last(&self) -> EngineResult<()> {
        if self.ledger.active_count() <= 1 {
            return Err(EngineError::LastPosition);
        }
        Ok(())
    }
}
