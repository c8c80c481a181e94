use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

use crate::error::LedgerError;

/// An amount of money in integer cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub fn to_cents(self) -> i64 {
        self.0
    }

    pub const fn zero() -> Self {
        Money(0)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_mul(self, rhs: i64) -> Option<Money> {
        self.0.checked_mul(rhs).map(Money)
    }

    /// Parses a bank or storefront amount such as `"1,234.56"` or `"-12.3"`.
    pub fn parse(text: &str) -> Result<Self, LedgerError> {
        parse_amount_to_cents(text).map(Money)
    }
}

/// Converts a decimal string into integer cents.
///
/// Commas are thousands separators and are removed first. The sign comes from
/// a leading `-`. Only the leading numeric run is read: one fractional digit
/// counts as tenths, two as cents, and anything after the second fractional
/// digit is ignored.
pub fn parse_amount_to_cents(text: &str) -> Result<i64, LedgerError> {
    let cleaned = text.replace(',', "");
    let (negative, unsigned) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };

    let whole_len = unsigned.bytes().take_while(u8::is_ascii_digit).count();
    if whole_len == 0 {
        return Err(LedgerError::InvalidAmount(text.to_string()));
    }
    let whole: i64 = unsigned[..whole_len]
        .parse()
        .map_err(|_| LedgerError::InvalidAmount(text.to_string()))?;

    let fraction: Vec<i64> = unsigned[whole_len..]
        .strip_prefix('.')
        .map(|rest| {
            rest.bytes()
                .take_while(u8::is_ascii_digit)
                .take(2)
                .map(|b| i64::from(b - b'0'))
                .collect()
        })
        .unwrap_or_default();
    let cents = match fraction.as_slice() {
        [] => 0,
        [tenths] => tenths * 10,
        [tenths, hundredths, ..] => tenths * 10 + hundredths,
    };

    let value = whole
        .checked_mul(100)
        .and_then(|v| v.checked_add(cents))
        .ok_or_else(|| LedgerError::InvalidAmount(text.to_string()))?;
    Ok(if negative { -value } else { value })
}

impl FromStr for Money {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::parse(s)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} €", Decimal::new(self.0, 2))
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;
    fn mul(self, rhs: i64) -> Self {
        Money(self.0 * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |a, b| a + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_thousands_separator() {
        assert_eq!(parse_amount_to_cents("1,234.56").unwrap(), 123456);
    }

    #[test]
    fn parse_negative_tenths() {
        assert_eq!(parse_amount_to_cents("-12.3").unwrap(), -1230);
    }

    #[test]
    fn parse_whole_number() {
        assert_eq!(parse_amount_to_cents("100").unwrap(), 10000);
        assert_eq!(parse_amount_to_cents("0").unwrap(), 0);
    }

    #[test]
    fn parse_exact_cents() {
        assert_eq!(parse_amount_to_cents("0.01").unwrap(), 1);
        assert_eq!(parse_amount_to_cents("49.99").unwrap(), 4999);
    }

    #[test]
    fn parse_reads_only_leading_run() {
        // Third fractional digit and trailing text are dropped, not rounded.
        assert_eq!(parse_amount_to_cents("12.345").unwrap(), 1234);
        assert_eq!(parse_amount_to_cents("12.").unwrap(), 1200);
        assert_eq!(parse_amount_to_cents("7 EUR").unwrap(), 700);
    }

    #[test]
    fn parse_rejects_missing_digits() {
        assert!(matches!(parse_amount_to_cents(""), Err(LedgerError::InvalidAmount(_))));
        assert!(parse_amount_to_cents("abc").is_err());
        assert!(parse_amount_to_cents("-").is_err());
        assert!(parse_amount_to_cents(".50").is_err());
    }

    #[test]
    fn money_from_str() {
        let m: Money = "19.9".parse().unwrap();
        assert_eq!(m.to_cents(), 1990);
    }

    #[test]
    fn display_uses_two_decimals() {
        assert_eq!(Money::from_cents(123456).to_string(), "1234.56 €");
        assert_eq!(Money::from_cents(-50).to_string(), "-0.50 €");
    }

    #[test]
    fn arithmetic() {
        let total: Money = [100, 250, -50].into_iter().map(Money::from_cents).sum();
        assert_eq!(total, Money::from_cents(300));
        assert_eq!(Money::from_cents(150) * 3, Money::from_cents(450));
        assert_eq!(-Money::from_cents(5), Money::from_cents(-5));
    }

    #[test]
    fn checked_arithmetic_detects_overflow() {
        assert_eq!(Money::from_cents(250).checked_mul(4), Some(Money::from_cents(1000)));
        assert_eq!(Money::from_cents(i64::MAX / 2 + 1).checked_mul(2), None);
        assert_eq!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)), None);
    }
}
