use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Sub},
};

use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};

/// Money amount represented as **integer minor units** (hundredths).
///
/// Use this type for **all** monetary values in the engine (accruals,
/// withdrawals, balances) to avoid floating-point drift. Decimals only exist
/// at the API boundary and are converted with [`to_minor_units`] and
/// [`to_decimal`].
///
/// # Examples
///
/// ```rust
/// use engine::MinorUnits;
/// use rust_decimal::Decimal;
///
/// let amount = MinorUnits::from_decimal(Decimal::new(72998, 2));
/// assert_eq!(amount.get(), 72998);
/// assert_eq!(amount.to_string(), "729.98");
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct MinorUnits(i64);

impl MinorUnits {
    pub const ZERO: MinorUnits = MinorUnits(0);

    /// Creates a new amount from integer minor units.
    #[must_use]
    pub const fn new(minor: i64) -> Self {
        Self(minor)
    }

    /// Returns the raw value in minor units.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Checked subtraction (returns `None` on overflow).
    #[must_use]
    pub fn checked_sub(self, rhs: MinorUnits) -> Option<MinorUnits> {
        self.0.checked_sub(rhs.0).map(MinorUnits)
    }

    /// Converts a decimal amount, truncating anything below hundredths.
    ///
    /// Values outside the `i64` range saturate.
    #[must_use]
    pub fn from_decimal(value: Decimal) -> Self {
        let saturated = if value.is_sign_negative() {
            i64::MIN
        } else {
            i64::MAX
        };
        Self::checked_from_decimal(value).unwrap_or(Self(saturated))
    }

    /// Like [`MinorUnits::from_decimal`], but `None` when out of range.
    #[must_use]
    pub fn checked_from_decimal(value: Decimal) -> Option<Self> {
        value
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|scaled| scaled.trunc().to_i64())
            .map(Self)
    }

    /// Converts back to a decimal with exactly two fractional digits.
    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }
}

/// Decimal to minor units. Sub-cent precision is dropped, not rounded.
#[must_use]
pub fn to_minor_units(value: Decimal) -> MinorUnits {
    MinorUnits::from_decimal(value)
}

/// Minor units to decimal.
#[must_use]
pub fn to_decimal(value: MinorUnits) -> Decimal {
    value.to_decimal()
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl From<i64> for MinorUnits {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<MinorUnits> for i64 {
    fn from(value: MinorUnits) -> Self {
        value.0
    }
}

impl Add for MinorUnits {
    type Output = MinorUnits;

    fn add(self, rhs: MinorUnits) -> Self::Output {
        MinorUnits(self.0 + rhs.0)
    }
}

impl AddAssign for MinorUnits {
    fn add_assign(&mut self, rhs: MinorUnits) {
        self.0 += rhs.0;
    }
}

impl Sub for MinorUnits {
    type Output = MinorUnits;

    fn sub(self, rhs: MinorUnits) -> Self::Output {
        MinorUnits(self.0 - rhs.0)
    }
}

impl Sum for MinorUnits {
    fn sum<I: Iterator<Item = MinorUnits>>(iter: I) -> Self {
        iter.fold(MinorUnits::ZERO, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn display_formats_hundredths() {
        assert_eq!(MinorUnits::new(0).to_string(), "0.00");
        assert_eq!(MinorUnits::new(1).to_string(), "0.01");
        assert_eq!(MinorUnits::new(1050).to_string(), "10.50");
        assert_eq!(MinorUnits::new(-1050).to_string(), "-10.50");
    }

    #[test]
    fn decimal_converts_to_minor_units() {
        assert_eq!(to_minor_units(dec("500")).get(), 50_000);
        assert_eq!(to_minor_units(dec("729.98")).get(), 72_998);
        assert_eq!(to_minor_units(dec("0.5")).get(), 50);
    }

    #[test]
    fn sub_cent_precision_is_truncated() {
        assert_eq!(to_minor_units(dec("12.349")).get(), 1234);
        assert_eq!(to_minor_units(dec("0.009")).get(), 0);
    }

    #[test]
    fn minor_units_convert_back_with_two_digits() {
        assert_eq!(to_decimal(MinorUnits::new(72_998)), dec("729.98"));
        assert_eq!(to_decimal(MinorUnits::new(50)).to_string(), "0.50");
    }

    #[test]
    fn oversized_values_saturate() {
        assert_eq!(to_minor_units(Decimal::MAX).get(), i64::MAX);
        assert_eq!(to_minor_units(Decimal::MIN).get(), i64::MIN);
        assert_eq!(MinorUnits::checked_from_decimal(Decimal::MAX), None);
        assert_eq!(
            MinorUnits::checked_from_decimal(dec("729.98")),
            Some(MinorUnits::new(72_998))
        );
    }
}
