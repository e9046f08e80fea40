//! Annual interest rates as stored by the position ledger.

use crate::domain::decimal::{Decimal, WadError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Annual interest rate, 1e18-scaled (`5 * 10^16` is 5%).
///
/// This is the sort key of the rate-ordered list.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct InterestRate(pub u128);

impl InterestRate {
    pub const ZERO: InterestRate = InterestRate(0);

    pub fn from_wad(wad: u128) -> Self {
        InterestRate(wad)
    }

    /// Build from an annual fraction (`0.05` for 5%).
    pub fn from_fraction(fraction: Decimal) -> Result<Self, WadError> {
        fraction.to_wad().map(InterestRate)
    }

    pub fn as_wad(&self) -> u128 {
        self.0
    }

    /// Absolute distance between two rates.
    pub fn abs_diff(&self, other: InterestRate) -> u128 {
        self.0.abs_diff(other.0)
    }

    pub fn to_fraction(&self) -> Option<Decimal> {
        Decimal::from_wad(self.0)
    }
}

impl fmt::Display for InterestRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_fraction() {
            Some(fraction) => write!(f, "{}%", fraction * Decimal::from_u64(100)),
            None => write!(f, "{}wad", self.0),
        }
    }
}
