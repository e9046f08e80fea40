//! Lossless decimal amounts backed by rust_decimal.
//!
//! Order-book amounts, rates and fees are all carried as `Decimal`. Conversion
//! to and from 1e18-scaled on-chain integers ("wad") happens only at the
//! ledger boundary.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of fractional digits in a wad-scaled integer.
pub const WAD_DECIMALS: u32 = 18;

/// Lossless decimal numeric type for token amounts and rates.
///
/// Serializes to a JSON number.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::float")] RustDecimal);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WadError {
    #[error("negative amount {0} has no wad representation")]
    Negative(String),
    #[error("amount {0} does not fit in 128 bits once scaled")]
    Overflow(String),
}

impl Decimal {
    pub fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Parse a Decimal from a string losslessly.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s).map(Decimal)
    }

    /// Format without exponent notation and without trailing zeros.
    pub fn to_canonical_string(&self) -> String {
        format!("{}", self.0.normalize())
    }

    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the value is > 0.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    pub fn from_u64(value: u64) -> Self {
        Decimal(RustDecimal::from(value))
    }

    /// Basis points denominator (10_000).
    pub fn bps_denominator() -> Self {
        Decimal(RustDecimal::from(10_000u32))
    }

    pub fn checked_add(self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_add(rhs.0).map(Decimal)
    }

    /// Multiplication that returns `None` when the product leaves the
    /// 96-bit mantissa range.
    pub fn checked_mul(self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_mul(rhs.0).map(Decimal)
    }

    /// Division that returns `None` on a zero divisor instead of panicking.
    pub fn checked_div(self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_div(rhs.0).map(Decimal)
    }

    /// Interpret an on-chain 1e18-scaled integer.
    ///
    /// Values beyond rust_decimal's 96-bit mantissa return `None`.
    pub fn from_wad(wad: u128) -> Option<Decimal> {
        let mantissa = i128::try_from(wad).ok()?;
        RustDecimal::try_from_i128_with_scale(mantissa, WAD_DECIMALS)
            .ok()
            .map(|d| Decimal(d.normalize()))
    }

    /// Scale to an on-chain 1e18 integer, truncating sub-wei digits.
    pub fn to_wad(&self) -> Result<u128, WadError> {
        if self.0.is_sign_negative() && !self.0.is_zero() {
            return Err(WadError::Negative(self.to_canonical_string()));
        }
        let mut scaled = self.0.trunc_with_scale(WAD_DECIMALS);
        scaled.rescale(WAD_DECIMALS);
        if scaled.scale() != WAD_DECIMALS {
            return Err(WadError::Overflow(self.to_canonical_string()));
        }
        u128::try_from(scaled.mantissa())
            .map_err(|_| WadError::Overflow(self.to_canonical_string()))
    }

    /// Lossy conversion used only for logging and property tests.
    pub fn to_f64_lossy(&self) -> f64 {
        self.0.to_f64().unwrap_or(f64::NAN)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

impl From<Decimal> for RustDecimal {
    fn from(value: Decimal) -> Self {
        value.0
    }
}

impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Decimal {
    fn add_assign(&mut self, rhs: Decimal) {
        self.0 += rhs.0;
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl std::ops::Div for Decimal {
    type Output = Decimal;

    fn div(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 / rhs.0)
    }
}

impl std::iter::Sum for Decimal {
    fn sum<I: Iterator<Item = Decimal>>(iter: I) -> Self {
        iter.fold(Decimal::zero(), |acc, d| acc + d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_canonical_string_strips_trailing_zeros() {
        assert_eq!(d("2500.000").to_canonical_string(), "2500");
        assert_eq!(d("0.0500").to_canonical_string(), "0.05");
    }

    #[test]
    fn test_min_max() {
        assert_eq!(d("3").min(d("5")), d("3"));
        assert_eq!(d("3").max(d("5")), d("5"));
    }

    #[test]
    fn test_checked_ops_report_overflow() {
        let max = d("79228162514264337593543950335");
        assert_eq!(max.checked_mul(d("2")), None);
        assert_eq!(max.checked_add(d("1")), None);
        assert_eq!(d("1.5").checked_mul(d("4")), Some(d("6")));
        assert_eq!(d("1.5").checked_add(d("4")), Some(d("5.5")));
    }

    #[test]
    fn test_checked_div_by_zero() {
        assert_eq!(d("10").checked_div(Decimal::zero()), None);
        assert_eq!(d("10").checked_div(d("4")), Some(d("2.5")));
    }

    #[test]
    fn test_wad_conversion() {
        assert_eq!(d("1.5").to_wad().unwrap(), 1_500_000_000_000_000_000);
        assert_eq!(d("0").to_wad().unwrap(), 0);
        assert_eq!(Decimal::from_wad(2_500_000_000_000_000_000), Some(d("2.5")));
        assert_eq!(Decimal::from_wad(1), Some(d("0.000000000000000001")));
    }

    #[test]
    fn test_wad_truncates_sub_wei_digits() {
        let tiny = d("0.0000000000000000019");
        assert_eq!(tiny.to_wad().unwrap(), 1);
    }

    #[test]
    fn test_negative_has_no_wad() {
        assert!(matches!(d("-1").to_wad(), Err(WadError::Negative(_))));
    }

    #[test]
    fn test_from_wad_rejects_oversized_values() {
        assert_eq!(Decimal::from_wad(u128::MAX), None);
    }

    #[test]
    fn test_sum() {
        let total: Decimal = vec![d("1"), d("2.5"), d("3")].into_iter().sum();
        assert_eq!(total, d("6.5"));
    }

    #[test]
    fn test_json_serialization_is_number() {
        let json = serde_json::to_value(d("366.5")).unwrap();
        assert!(json.is_number());
    }
}
