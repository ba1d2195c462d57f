//! Fixed-point amount representation
//!
//! All storage and arithmetic use integer minor units at 10^-6 DGT
//! granularity. Decimal values appear only at the external boundary,
//! so balances never accumulate floating-point drift.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Decimal places in the display form
pub const SCALE: u32 = 6;

/// Minor units per whole DGT (10^6)
pub const MINOR_PER_UNIT: i64 = 1_000_000;

/// Signed amount in minor units (10^-6 DGT)
///
/// Balances stay non-negative by engine invariant; ledger entry amounts
/// use the sign to distinguish credits (positive) from debits (negative).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MinorUnits(i64);

impl MinorUnits {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Wrap a raw minor-unit count
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw minor-unit count
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Checked addition
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Checked subtraction
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// Checked multiplication by a scalar count
    pub fn checked_mul(self, count: i64) -> Option<Self> {
        self.0.checked_mul(count).map(Self)
    }

    /// Negated amount (debit form of a credit)
    pub fn negate(self) -> Self {
        Self(-self.0)
    }

    /// Whole-percent share, truncated toward zero
    pub fn percent_share(self, percent: u8) -> Self {
        // i64 * u8 as i128 cannot overflow
        Self((self.0 as i128 * percent as i128 / 100) as i64)
    }

    /// True if the amount is strictly positive
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// True if the amount is negative
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", to_display(*self))
    }
}

/// Convert a display decimal to minor units
///
/// Multiplies by 10^6 and truncates toward zero. Sub-micro precision in
/// the input is discarded (the documented lossy direction). Values whose
/// scaled form does not fit an `i64` are rejected.
pub fn to_minor(display: Decimal) -> Result<MinorUnits> {
    let scaled = display
        .checked_mul(Decimal::from(MINOR_PER_UNIT))
        .ok_or_else(|| Error::Validation(format!("amount out of range: {}", display)))?;

    let raw = scaled
        .trunc()
        .to_i64()
        .ok_or_else(|| Error::Validation(format!("amount out of range: {}", display)))?;

    Ok(MinorUnits(raw))
}

/// Convert minor units to the display decimal
///
/// Exact: minor units are the canonical integer form, so no rounding
/// occurs in this direction.
pub fn to_display(minor: MinorUnits) -> Decimal {
    Decimal::new(minor.0, SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_to_minor_whole_units() {
        let m = to_minor(Decimal::from(200)).unwrap();
        assert_eq!(m.raw(), 200_000_000);
    }

    #[test]
    fn test_to_minor_truncates_toward_zero() {
        let d = Decimal::from_str("1.2345678").unwrap();
        assert_eq!(to_minor(d).unwrap().raw(), 1_234_567);

        let neg = Decimal::from_str("-1.2345678").unwrap();
        assert_eq!(to_minor(neg).unwrap().raw(), -1_234_567);
    }

    #[test]
    fn test_to_display_exact() {
        let d = to_display(MinorUnits::from_raw(1_234_567));
        assert_eq!(d, Decimal::from_str("1.234567").unwrap());
    }

    #[test]
    fn test_round_trip_law() {
        for raw in [0i64, 1, 999_999, 1_000_000, 123_456_789_012_345] {
            let m = MinorUnits::from_raw(raw);
            assert_eq!(to_minor(to_display(m)).unwrap(), m);
        }
    }

    #[test]
    fn test_out_of_range_rejected() {
        let huge = Decimal::from_str("99999999999999999999").unwrap();
        assert!(to_minor(huge).is_err());
    }

    #[test]
    fn test_percent_share_floors() {
        let m = MinorUnits::from_raw(101);
        assert_eq!(m.percent_share(50).raw(), 50);
        assert_eq!(m.percent_share(0).raw(), 0);
        assert_eq!(m.percent_share(100).raw(), 101);
    }

    #[test]
    fn test_checked_arithmetic() {
        let max = MinorUnits::from_raw(i64::MAX);
        assert!(max.checked_add(MinorUnits::from_raw(1)).is_none());
        assert_eq!(
            MinorUnits::from_raw(5)
                .checked_sub(MinorUnits::from_raw(2))
                .unwrap()
                .raw(),
            3
        );
    }
}
