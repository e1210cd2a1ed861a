//! Money, discounts and the order total formula.

use serde::{Deserialize, Serialize};

/// Money amount represented in cents to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the dollar portion (whole number).
    pub fn dollars(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after dollars).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    /// Applies a discount, rounding to the nearest cent.
    pub fn discounted(&self, discount: Discount) -> Money {
        let net = self.cents as f64 * (1.0 - discount.fraction());
        Money {
            cents: net.round() as i64,
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    /// Saturates at the `i64` bounds.
    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_add(rhs.cents),
        }
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// Error returned when a discount fraction falls outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvalidDiscount(pub f64);

impl std::fmt::Display for InvalidDiscount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "discount {} is outside [0, 1]", self.0)
    }
}

impl std::error::Error for InvalidDiscount {}

/// Fraction of the price taken off, always within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Discount(f64);

impl Discount {
    /// Creates a discount, rejecting fractions outside `[0, 1]` and NaN.
    pub fn new(fraction: f64) -> Result<Self, InvalidDiscount> {
        if (0.0..=1.0).contains(&fraction) {
            Ok(Self(fraction))
        } else {
            Err(InvalidDiscount(fraction))
        }
    }

    /// No discount.
    pub fn none() -> Self {
        Self(0.0)
    }

    /// Returns the fraction.
    pub fn fraction(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Discount {
    type Error = InvalidDiscount;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Discount> for f64 {
    fn from(d: Discount) -> Self {
        d.0
    }
}

/// Computes an order total as `Σ price × (1 − discount)` over the line items.
///
/// Every component that prices an order must go through this function: the
/// coordinator's estimate and the materializer's persisted total are compared
/// for audit and must be identical. Quantity is not a factor.
pub fn order_total(lines: impl IntoIterator<Item = (Money, Discount)>) -> Money {
    lines
        .into_iter()
        .map(|(price, discount)| price.discounted(discount))
        .sum()
}
