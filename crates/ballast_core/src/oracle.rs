//! Price source

use crate::error::{EngineError, EngineResult};

/// Source of the collateral price in stablecoin, 18-decimal fixed point
pub trait PriceFeed {
    fn current_price(&self) -> EngineResult<u128>;
}

/// A price that never moves
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedPrice(pub u128);

impl PriceFeed for FixedPrice {
    fn current_price(&self) -> EngineResult<u128> {
        if self.0 == 0 {
            return Err(EngineError::InvalidPrice);
        }
        Ok(self.0)
    }
}

impl<T: PriceFeed + ?Sized> PriceFeed for &T {
    fn current_price(&self) -> EngineResult<u128> {
        (**self).current_price()
    }
}
