//! Aggregated quotes over the loan order book.

use crate::domain::{Decimal, Side};
use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One order's contribution to a quote. Orders are never split, so `amount`
/// is the order's full open amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub order_id: u64,
    pub rate: Decimal,
    pub amount: Decimal,
}

/// Scan bookkeeping attached to a quote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    /// Order ids looked up.
    pub scanned: usize,
    /// Active, well-formed orders eligible for routing.
    pub eligible: usize,
    pub inactive: usize,
    pub malformed: usize,
    /// Lookups that failed at the ledger and were treated as inactive.
    pub failed: usize,
    /// The book holds more orders than the scan window covered.
    pub truncated: bool,
}

/// Blended quote for a requested amount.
///
/// Invariant: `coverage` equals the sum of route amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub side: Side,
    pub requested: Decimal,
    pub coverage: Decimal,
    pub blended_rate: Decimal,
    pub min_rate: Decimal,
    pub max_rate: Decimal,
    pub estimated_fee: Decimal,
    pub routes: Vec<Route>,
    pub stats: ScanStats,
    pub quoted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("insufficient liquidity: requested {requested}, covered {coverage}")]
pub struct InsufficientLiquidity {
    pub requested: Decimal,
    pub coverage: Decimal,
}

impl InsufficientLiquidity {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InsufficientLiquidity
    }
}

impl Quote {
    pub fn is_fully_covered(&self) -> bool {
        self.coverage >= self.requested
    }

    /// Amount still missing, zero when fully covered.
    pub fn shortfall(&self) -> Decimal {
        if self.is_fully_covered() {
            Decimal::zero()
        } else {
            self.requested - self.coverage
        }
    }

    /// Turn under-coverage into an error for callers that cannot proceed
    /// with a partial fill.
    pub fn ensure_covered(&self) -> Result<(), InsufficientLiquidity> {
        if self.is_fully_covered() {
            Ok(())
        } else {
            Err(InsufficientLiquidity {
                requested: self.requested,
                coverage: self.coverage,
            })
        }
    }
}
