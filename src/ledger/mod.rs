//! Read-only access to the on-chain position ledger and loan order book.

use crate::domain::{InterestRate, Position, PositionId, RawOrder, Side};
use async_trait::async_trait;
use std::fmt;

pub mod abi;
pub mod mock;
pub mod rpc;

pub use mock::MockLedger;
pub use rpc::RpcLedgerReader;

/// Result of one approximate-hint oracle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApproxHint {
    /// Best candidate among the sampled positions.
    pub hint_id: PositionId,
    /// Rate distance between the candidate and the target.
    pub diff: u128,
    /// Seed to feed into the next call so trials do not repeat.
    pub latest_seed: u64,
}

/// Read-only ledger collaborator.
///
/// `branch` is the collateral branch index the ledger uses to key its
/// per-collateral contracts.
#[async_trait]
pub trait LedgerReader: Send + Sync + fmt::Debug {
    /// Number of positions in the branch's rate-ordered list.
    async fn get_list_size(&self, branch: u32) -> Result<u64, LedgerError>;

    /// Sample `num_trials` random positions and return the one whose rate is
    /// closest to `rate`.
    async fn get_approx_hint(
        &self,
        branch: u32,
        rate: InterestRate,
        num_trials: u64,
        seed: u64,
    ) -> Result<ApproxHint, LedgerError>;

    /// Walk from the supplied neighbours to the exact insert position for
    /// `rate`. Returns `(upper, lower)` where `rate(upper) <= rate <=
    /// rate(lower)`; either is zero at the ends of the list.
    async fn find_insert_position(
        &self,
        branch: u32,
        rate: InterestRate,
        prev_id: PositionId,
        next_id: PositionId,
    ) -> Result<(PositionId, PositionId), LedgerError>;

    /// Latest state of a position, or `None` if it is not open.
    async fn get_position(
        &self,
        branch: u32,
        id: PositionId,
    ) -> Result<Option<Position>, LedgerError>;

    /// Raw order record from the `side` book, or `None` if no such id.
    async fn get_order(&self, side: Side, id: u64) -> Result<Option<RawOrder>, LedgerError>;

    /// Highest order id issued on the `side` book.
    async fn get_order_counter(&self, side: Side) -> Result<u64, LedgerError>;
}

/// Error type for ledger reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Transport failure or timeout
    NetworkError(String),
    /// Non-success HTTP status from the RPC endpoint
    HttpError { status: u16, message: String },
    /// Response could not be decoded
    ParseError(String),
    /// Rate limit exceeded
    RateLimited,
    /// The call reverted or the contract is not deployed
    Unavailable(String),
    /// No contracts configured for this collateral branch
    BranchNotFound(u32),
    /// A required address is missing from configuration
    NotConfigured(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            LedgerError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            LedgerError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            LedgerError::RateLimited => write!(f, "Rate limited"),
            LedgerError::Unavailable(msg) => write!(f, "Unavailable: {}", msg),
            LedgerError::BranchNotFound(index) => write!(f, "Branch not found: {}", index),
            LedgerError::NotConfigured(what) => write!(f, "Not configured: {}", what),
        }
    }
}

impl std::error::Error for LedgerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_error_display() {
        let err = LedgerError::NetworkError("connection timeout".to_string());
        assert_eq!(err.to_string(), "Network error: connection timeout");

        let err = LedgerError::HttpError {
            status: 429,
            message: "Too many requests".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 429: Too many requests");

        let err = LedgerError::BranchNotFound(3);
        assert_eq!(err.to_string(), "Branch not found: 3");

        let err = LedgerError::NotConfigured("ORDER_BOOK_ADDRESS".to_string());
        assert_eq!(err.to_string(), "Not configured: ORDER_BOOK_ADDRESS");
    }
}
