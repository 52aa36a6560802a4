//! Accounting core of a collateralized-debt stablecoin
//!
//! Positions lock collateral against stablecoin debt. Positions that fall
//! below the minimum collateral ratio are liquidated: their debt is cancelled
//! against Stability Pool deposits where possible and otherwise redistributed
//! over every remaining position. Both paths are O(1) per affected account,
//! using running product/sum accumulators instead of per-position updates.
//!
//! Pure library: no I/O, no clock, no token movements. Time and price come in
//! as arguments, token movements go out as [`hooks::Transfer`] records.

pub mod error;
pub mod helpers;
pub mod hooks;
pub mod liquidation;
pub mod math;
pub mod oracle;
pub mod params;
pub mod state;
pub mod transitions;

pub use error::{EngineError, EngineResult, ErrorKind};
pub use hooks::{Transfer, TransferSink};
pub use liquidation::{LiquidationOutcome, LiquidationPath, LiquidationTotals, LiquidationValues};
pub use oracle::{FixedPrice, PriceFeed};
pub use params::ProtocolParams;
pub use state::position::{AccountId, Position, Status};
pub use state::{EntireDebtAndColl, State};
pub use transitions::borrower::Adjustment;
pub use transitions::redemption::RedemptionOutcome;
pub use transitions::stability::Withdrawal;
pub use transitions::Hints;
