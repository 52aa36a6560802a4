//! Price read from a file another process keeps current

use anyhow::{Context, Result};
use ballast_core::math::parse_wad;
use ballast_core::FixedPrice;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PriceError {
    #[error("price file contents {0:?} are not a decimal number")]
    Unparseable(String),
    #[error("price file holds a zero price")]
    Zero,
}

pub fn parse_price(text: &str) -> Result<FixedPrice, PriceError> {
    let price = parse_wad(text).ok_or_else(|| PriceError::Unparseable(text.trim().to_string()))?;
    if price == 0 {
        return Err(PriceError::Zero);
    }
    Ok(FixedPrice(price))
}

pub struct FilePriceFeed {
    path: String,
}

impl FilePriceFeed {
    pub fn new(path: String) -> Self {
        Self { path }
    }

    /// Read the price once; a tick uses the same value throughout
    pub fn fetch(&self) -> Result<FixedPrice> {
        let text = std::fs::read_to_string(&self.path)
            .context(format!("Failed to read price file {}", self.path))?;
        let price = parse_price(&text).context(format!("Bad price in {}", self.path))?;
        Ok(price)
    }
}
