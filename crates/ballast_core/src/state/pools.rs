//! Pool balances
//!
//! Every pool holds collateral plus a stablecoin-denominated figure: debt for
//! the Active and Default pools, total deposits for the Stability Pool. The
//! Collateral Surplus pool only holds collateral owed back to owners.

use crate::error::{EngineError, EngineResult};
use crate::math::{add, sub};
use crate::state::position::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pool {
    /// Collateral and debt of open positions
    Active,
    /// Liquidated collateral and debt awaiting redistribution
    Default,
    /// Depositor funds and the collateral gains they earned
    Stability,
    /// Collateral owed to owners after capped liquidations and full redemptions
    Surplus,
}

impl Pool {
    pub fn name(self) -> &'static str {
        match self {
            Pool::Active => "active pool",
            Pool::Default => "default pool",
            Pool::Stability => "stability pool",
            Pool::Surplus => "surplus pool",
        }
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Asset {
    Collateral,
    Stable,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub collateral: u128,
    pub stable: u128,
}

impl Balance {
    fn get(&self, asset: Asset) -> u128 {
        match asset {
            Asset::Collateral => self.collateral,
            Asset::Stable => self.stable,
        }
    }

    fn slot(&mut self, asset: Asset) -> &mut u128 {
        match asset {
            Asset::Collateral => &mut self.collateral,
            Asset::Stable => &mut self.stable,
        }
    }
}

/// Collateral entering and leaving the system, for the conservation check
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralFlows {
    pub deposited: u128,
    pub withdrawn: u128,
    pub incentives_paid: u128,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pools {
    active: Balance,
    default: Balance,
    stability: Balance,
    surplus: Balance,
    surplus_claims: BTreeMap<AccountId, u128>,
    flows: CollateralFlows,
}

impl Pools {
    pub fn new() -> Self {
        Self::default()
    }

    fn pool(&self, pool: Pool) -> &Balance {
        match pool {
            Pool::Active => &self.active,
            Pool::Default => &self.default,
            Pool::Stability => &self.stability,
            Pool::Surplus => &self.surplus,
        }
    }

    fn pool_mut(&mut self, pool: Pool) -> &mut Balance {
        match pool {
            Pool::Active => &mut self.active,
            Pool::Default => &mut self.default,
            Pool::Stability => &mut self.stability,
            Pool::Surplus => &mut self.surplus,
        }
    }

    pub fn balance(&self, pool: Pool, asset: Asset) -> u128 {
        self.pool(pool).get(asset)
    }

    pub fn deposit(&mut self, pool: Pool, asset: Asset, amount: u128) -> EngineResult<()> {
        let slot = self.pool_mut(pool).slot(asset);
        *slot = add(*slot, amount)?;
        Ok(())
    }

    pub fn withdraw(&mut self, pool: Pool, asset: Asset, amount: u128) -> EngineResult<()> {
        let slot = self.pool_mut(pool).slot(asset);
        *slot = sub(*slot, amount, pool.name())?;
        Ok(())
    }

    /// Move an amount between two pools; both sides are checked before either changes
    pub fn transfer(&mut self, from: Pool, to: Pool, asset: Asset, amount: u128) -> EngineResult<()> {
        if from == to {
            return Ok(());
        }
        let new_from = sub(self.balance(from, asset), amount, from.name())?;
        let new_to = add(self.balance(to, asset), amount)?;
        *self.pool_mut(from).slot(asset) = new_from;
        *self.pool_mut(to).slot(asset) = new_to;
        Ok(())
    }

    // Collateral crossing the system boundary

    pub fn collateral_in(&mut self, pool: Pool, amount: u128) -> EngineResult<()> {
        let deposited = add(self.flows.deposited, amount)?;
        self.deposit(pool, Asset::Collateral, amount)?;
        self.flows.deposited = deposited;
        Ok(())
    }

    pub fn collateral_out(&mut self, pool: Pool, amount: u128) -> EngineResult<()> {
        let withdrawn = add(self.flows.withdrawn, amount)?;
        self.withdraw(pool, Asset::Collateral, amount)?;
        self.flows.withdrawn = withdrawn;
        Ok(())
    }

    /// Collateral paid to a liquidator out of the Active Pool
    pub fn pay_incentive(&mut self, amount: u128) -> EngineResult<()> {
        let paid = add(self.flows.incentives_paid, amount)?;
        self.withdraw(Pool::Active, Asset::Collateral, amount)?;
        self.flows.incentives_paid = paid;
        Ok(())
    }

    pub fn flows(&self) -> CollateralFlows {
        self.flows
    }

    // Collateral surplus claims

    /// Credit collateral already moved into the Surplus pool to `owner`
    pub fn account_surplus(&mut self, owner: AccountId, amount: u128) -> EngineResult<()> {
        let claim = self.surplus_claims.entry(owner).or_insert(0);
        *claim = add(*claim, amount)?;
        Ok(())
    }

    pub fn surplus_of(&self, owner: AccountId) -> u128 {
        self.surplus_claims.get(&owner).copied().unwrap_or(0)
    }

    /// Pay out an owner's whole surplus
    pub fn claim_surplus(&mut self, owner: AccountId) -> EngineResult<u128> {
        let amount = self.surplus_of(owner);
        if amount == 0 {
            return Err(EngineError::NoCollateralSurplus(owner));
        }
        self.collateral_out(Pool::Surplus, amount)?;
        self.surplus_claims.remove(&owner);
        Ok(amount)
    }
}
