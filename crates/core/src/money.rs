use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid amount: '{0}'")]
pub struct AmountError(pub String);

/// Exact decimal amount. Statement amounts are never routed through floats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn new(amount: Decimal) -> Self {
        Money(amount)
    }

    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, 2))
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    /// Parses statement-formatted amounts: `$1,234.56`, `-$24.55`, `(75.25)`, `2,933.53`.
    pub fn parse(raw: &str) -> Result<Self, AmountError> {
        let s = raw.trim();
        let (negative, s) = if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
            (true, &s[1..s.len() - 1])
        } else {
            (false, s)
        };
        let cleaned = s.replace(['$', ',', ' '], "");
        if cleaned.is_empty() {
            return Err(AmountError(raw.to_string()));
        }
        let mut value = Decimal::from_str(&cleaned).map_err(|_| AmountError(raw.to_string()))?;
        if negative {
            value = -value;
        }
        Ok(Money(value))
    }
}

impl FromStr for Money {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::parse(s)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money(value)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rounded = self.0.abs().round_dp(2);
        let text = format!("{rounded:.2}");
        let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, ch) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }

        let sign = if self.is_negative() { "-" } else { "" };
        write!(f, "{sign}${grouped}.{frac}")
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::zero(), |a, b| a + b)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
