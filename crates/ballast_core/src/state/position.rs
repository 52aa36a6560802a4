//! Position ledger: one collateral/debt record per owner

use crate::error::{EngineError, EngineResult};
use crate::math::{add, sub};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Owner of a position or stability deposit
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[default]
    NonExistent,
    Active,
    ClosedByOwner,
    ClosedByLiquidation,
    ClosedByRedemption,
}

/// Accumulator values (`L_coll`, `L_debt`) at the last time the position was touched
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSnapshot {
    pub coll_per_stake: u128,
    pub debt_per_stake: u128,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Gross debt, liquidation reserve included
    pub debt: u128,
    pub coll: u128,
    pub stake: u128,
    pub status: Status,
    pub snapshot: RewardSnapshot,
}

impl Position {
    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionLedger {
    positions: BTreeMap<AccountId, Position>,
    total_stakes: u128,
    active_count: usize,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: AccountId) -> Option<&Position> {
        self.positions.get(&id)
    }

    pub fn status(&self, id: AccountId) -> Status {
        self.positions.get(&id).map(|p| p.status).unwrap_or_default()
    }

    pub fn is_active(&self, id: AccountId) -> bool {
        self.status(id) == Status::Active
    }

    pub fn get_active(&self, id: AccountId) -> EngineResult<&Position> {
        match self.positions.get(&id) {
            Some(p) if p.is_active() => Ok(p),
            _ => Err(EngineError::PositionNotActive(id)),
        }
    }

    pub fn get_active_mut(&mut self, id: AccountId) -> EngineResult<&mut Position> {
        match self.positions.get_mut(&id) {
            Some(p) if p.is_active() => Ok(p),
            _ => Err(EngineError::PositionNotActive(id)),
        }
    }

    pub fn total_stakes(&self) -> u128 {
        self.total_stakes
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Active positions in id order
    pub fn iter_active(&self) -> impl Iterator<Item = (AccountId, &Position)> {
        self.positions
            .iter()
            .filter(|(_, p)| p.is_active())
            .map(|(id, p)| (*id, p))
    }

    /// Create (or re-open) a position. Stake is counted into the total here.
    pub fn activate(
        &mut self,
        id: AccountId,
        coll: u128,
        debt: u128,
        stake: u128,
        snapshot: RewardSnapshot,
    ) -> EngineResult<()> {
        if self.is_active(id) {
            return Err(EngineError::PositionAlreadyActive(id));
        }
        let total_stakes = add(self.total_stakes, stake)?;
        self.positions.insert(
            id,
            Position {
                debt,
                coll,
                stake,
                status: Status::Active,
                snapshot,
            },
        );
        self.total_stakes = total_stakes;
        self.active_count += 1;
        Ok(())
    }

    /// Replace a position's stake, keeping the total in step
    pub fn set_stake(&mut self, id: AccountId, new_stake: u128) -> EngineResult<()> {
        let old_stake = self.get_active(id)?.stake;
        let total = add(sub(self.total_stakes, old_stake, "total stakes")?, new_stake)?;
        self.get_active_mut(id)?.stake = new_stake;
        self.total_stakes = total;
        Ok(())
    }

    /// Close a position, returning the record as it was just before closing
    pub fn close(&mut self, id: AccountId, status: Status) -> EngineResult<Position> {
        debug_assert!(status != Status::Active && status != Status::NonExistent);
        let before = self.get_active(id)?.clone();
        let total_stakes = sub(self.total_stakes, before.stake, "total stakes")?;

        let position = self.get_active_mut(id)?;
        position.coll = 0;
        position.debt = 0;
        position.stake = 0;
        position.snapshot = RewardSnapshot::default();
        position.status = status;

        self.total_stakes = total_stakes;
        self.active_count -= 1;
        Ok(before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activate_and_close() {
        let mut ledger = PositionLedger::new();
        let id = AccountId(1);
        assert_eq!(ledger.status(id), Status::NonExistent);
        assert_eq!(Position::default().status, Status::default());
        assert_eq!(Status::default(), Status::NonExistent);

        ledger.activate(id, 10, 20, 10, RewardSnapshot::default()).unwrap();
        assert_eq!(ledger.active_count(), 1);
        assert_eq!(ledger.total_stakes(), 10);
        assert_eq!(
            ledger.activate(id, 1, 1, 1, RewardSnapshot::default()),
            Err(EngineError::PositionAlreadyActive(id))
        );

        let closed = ledger.close(id, Status::ClosedByLiquidation).unwrap();
        assert_eq!(closed.coll, 10);
        assert_eq!(closed.debt, 20);
        assert_eq!(ledger.status(id), Status::ClosedByLiquidation);
        assert_eq!(ledger.total_stakes(), 0);
        assert_eq!(ledger.active_count(), 0);

        let p = ledger.get(id).unwrap();
        assert_eq!((p.coll, p.debt, p.stake), (0, 0, 0));
        assert_eq!(p.snapshot, RewardSnapshot::default());
    }

    #[test]
    fn test_reopen_after_close() {
        let mut ledger = PositionLedger::new();
        let id = AccountId(4);
        ledger.activate(id, 10, 20, 10, RewardSnapshot::default()).unwrap();
        ledger.close(id, Status::ClosedByOwner).unwrap();
        ledger.activate(id, 30, 20, 15, RewardSnapshot::default()).unwrap();
        assert_eq!(ledger.total_stakes(), 15);
        assert_eq!(ledger.iter_active().count(), 1);
    }

    #[test]
    fn test_set_stake_tracks_total() {
        let mut ledger = PositionLedger::new();
        ledger.activate(AccountId(1), 10, 20, 10, RewardSnapshot::default()).unwrap();
        ledger.activate(AccountId(2), 10, 20, 7, RewardSnapshot::default()).unwrap();
        ledger.set_stake(AccountId(1), 3).unwrap();
        assert_eq!(ledger.total_stakes(), 10);
        assert_eq!(ledger.set_stake(AccountId(9), 3), Err(EngineError::PositionNotActive(AccountId(9))));
    }

    #[test]
    fn test_close_inactive_fails() {
        let mut ledger = PositionLedger::new();
        assert_eq!(
            ledger.close(AccountId(2), Status::ClosedByOwner),
            Err(EngineError::PositionNotActive(AccountId(2)))
        );
    }
}
