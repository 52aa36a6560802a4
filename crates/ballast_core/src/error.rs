//! Engine error type

use crate::state::position::AccountId;
use thiserror::Error;

/// Broad classes of failure, used by hosts to decide whether a call can be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The operation is not allowed against this position or in this mode
    PreconditionViolation,
    /// The operation would break a system-wide safety rule
    InvariantGuard,
    /// A balance would go negative or a product overflowed. Always a bug.
    ArithmeticGuard,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    // Preconditions
    #[error("position {0} is not active")]
    PositionNotActive(AccountId),
    #[error("position {0} is already active")]
    PositionAlreadyActive(AccountId),
    #[error("nothing to liquidate")]
    NothingToLiquidate,
    #[error("amount must be greater than zero")]
    ZeroAmount,
    #[error("{0} has no stability pool deposit")]
    NoDeposit(AccountId),
    #[error("cannot withdraw from the stability pool while positions are below MCR")]
    UndercollateralizedPositions,
    #[error("net debt {net_debt} is below the minimum {minimum}")]
    NetDebtTooSmall { net_debt: u128, minimum: u128 },
    #[error("collateral ratio {icr} is below the required {required}")]
    CollateralRatioTooLow { icr: u128, required: u128 },
    #[error("fee percentage {actual} exceeds the accepted maximum {max}")]
    FeeExceedsMaximum { actual: u128, max: u128 },
    #[error("max fee percentage {0} is outside the accepted range")]
    InvalidMaxFee(u128),
    #[error("operation not permitted in recovery mode")]
    NotPermittedInRecoveryMode,
    #[error("debt repayment {repay} exceeds position debt {available}")]
    RepaymentTooLarge { repay: u128, available: u128 },
    #[error("collateral withdrawal {withdraw} exceeds position collateral {available}")]
    WithdrawalTooLarge { withdraw: u128, available: u128 },
    #[error("unable to redeem any amount")]
    UnableToRedeem,
    #[error("redemptions are disabled while TCR is below MCR")]
    RedemptionBelowMcr,
    #[error("no collateral surplus available for {0}")]
    NoCollateralSurplus(AccountId),
    #[error("sorted index is full")]
    IndexFull,
    #[error("invalid protocol parameters: {0}")]
    InvalidParams(&'static str),
    #[error("price must be non-zero")]
    InvalidPrice,

    // Invariant guards
    #[error("the last remaining position cannot be closed or liquidated")]
    LastPosition,
    #[error("operation would push TCR below the critical ratio")]
    TcrBelowCritical,

    // Arithmetic guards
    #[error("arithmetic overflow")]
    Overflow,
    #[error("arithmetic underflow in {0}")]
    Underflow(&'static str),
    #[error("division by zero")]
    DivisionByZero,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::LastPosition | EngineError::TcrBelowCritical => ErrorKind::InvariantGuard,
            EngineError::Overflow | EngineError::Underflow(_) | EngineError::DivisionByZero => {
                ErrorKind::ArithmeticGuard
            }
            _ => ErrorKind::PreconditionViolation,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::ArithmeticGuard
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
