//! Error taxonomy for the liquidity gateway
//!
//! Rejections surface as short reason strings; conflict recovery (the
//! auction's next-best-offer cascade) happens locally and is never shown
//! to the taker.

use crate::ids::OrderId;
use rust_decimal::Decimal;
use thiserror::Error;

/// Top-level error for the liquidity/quoting/matching core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Malformed input (bad side/price/size, both-or-neither size params).
    /// Synchronous rejection, never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Caller is not allowed to perform this action (self-trade, wrong signer).
    #[error("not authorized: {0}")]
    Authorization(String),

    /// State moved underneath the caller (order no longer open, auction
    /// already resolved).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The maker holds a busy lock from a prior match awaiting settlement.
    #[error("maker busy: order {order_id} pending, lock expires in {remaining_secs}s")]
    MakerBusy {
        order_id: OrderId,
        remaining_secs: i64,
    },

    /// Visible depth cannot cover the requested size. No partial quote.
    #[error("insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity {
        requested: Decimal,
        available: Decimal,
    },

    /// Malformed derived state (degenerate price, broken snapshot).
    /// Surfaced and logged loudly, never silently substituted.
    #[error("internal error: {0}")]
    Internal(String),

    /// Store or database connectivity failure. Not retried here.
    #[error("store unavailable: {0}")]
    Transient(String),
}

impl CoreError {
    /// Short machine-readable code for event payloads and logs.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "VALIDATION",
            CoreError::Authorization(_) => "AUTHORIZATION",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::MakerBusy { .. } => "MAKER_BUSY",
            CoreError::InsufficientLiquidity { .. } => "INSUFFICIENT_LIQUIDITY",
            CoreError::Internal(_) => "INTERNAL",
            CoreError::Transient(_) => "TRANSIENT",
        }
    }
}
