//! Stock, reservation records and reservation outcomes.

use chrono::{DateTime, Utc};
use common::{Discount, Money, OrderId, ProductId, SagaId};
use event_channel::{LineItem, ReservationLine};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

/// Stock level and pricing of one product.
///
/// `available_quantity` never exceeds `total_quantity`. Reserving moves
/// quantity out of `available_quantity`; confirming removes it from
/// `total_quantity`; releasing puts it back into `available_quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductStock {
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
    pub discount: Discount,
    pub total_quantity: u32,
    pub available_quantity: u32,
}

impl ProductStock {
    /// Creates a product with all of its stock available.
    pub fn new(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Money,
        discount: Discount,
        quantity: u32,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            price,
            discount,
            total_quantity: quantity,
            available_quantity: quantity,
        }
    }

    /// Checks the stock invariants.
    pub fn validate(&self) -> Result<()> {
        if self.available_quantity > self.total_quantity {
            return Err(LedgerError::InvalidStock {
                product_id: self.product_id.clone(),
                reason: format!(
                    "available quantity {} exceeds total quantity {}",
                    self.available_quantity, self.total_quantity
                ),
            });
        }
        if self.price.cents() < 0 {
            return Err(LedgerError::InvalidStock {
                product_id: self.product_id.clone(),
                reason: format!("negative price {}", self.price),
            });
        }
        Ok(())
    }

    /// Fits this definition over stock that reservations already hold.
    ///
    /// Held units never count as available, so `available_quantity` is capped
    /// at `total_quantity - held`. A total below what is held is refused.
    pub fn net_of_holds(mut self, held: u32) -> Result<Self> {
        let Some(free) = self.total_quantity.checked_sub(held) else {
            return Err(self.invalid(format!(
                "total quantity {} is below the {held} units held by reservations",
                self.total_quantity
            )));
        };
        self.available_quantity = self.available_quantity.min(free);
        Ok(self)
    }

    /// Puts `quantity` held units back into `available_quantity`.
    pub fn release_units(&mut self, quantity: u32) -> Result<()> {
        let available = self
            .available_quantity
            .checked_add(quantity)
            .filter(|a| *a <= self.total_quantity)
            .ok_or_else(|| {
                self.invalid(format!(
                    "releasing {quantity} units would exceed total quantity {}",
                    self.total_quantity
                ))
            })?;
        self.available_quantity = available;
        Ok(())
    }

    /// Removes `quantity` sold units from `total_quantity`.
    pub fn confirm_units(&mut self, quantity: u32) -> Result<()> {
        let total = self
            .total_quantity
            .checked_sub(quantity)
            .filter(|t| *t >= self.available_quantity)
            .ok_or_else(|| {
                self.invalid(format!(
                    "confirming {quantity} units would leave total quantity {} below available {}",
                    self.total_quantity, self.available_quantity
                ))
            })?;
        self.total_quantity = total;
        Ok(())
    }

    fn invalid(&self, reason: String) -> LedgerError {
        LedgerError::InvalidStock {
            product_id: self.product_id.clone(),
            reason,
        }
    }

    /// Returns the priced line for `quantity` units of this product.
    pub fn line_item(&self, quantity: u32) -> LineItem {
        LineItem {
            product_id: self.product_id.clone(),
            name: self.name.clone(),
            quantity,
            price: self.price,
            discount: self.discount,
        }
    }
}

/// Lifecycle of a reservation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    /// Stock held for a running saga.
    Reserved,
    /// Sold; total stock decremented.
    Confirmed,
    /// Given back by compensation.
    Released,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Reserved => "RESERVED",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Released => "RELEASED",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RESERVED" => Ok(ReservationStatus::Reserved),
            "CONFIRMED" => Ok(ReservationStatus::Confirmed),
            "RELEASED" => Ok(ReservationStatus::Released),
            other => Err(LedgerError::CorruptRow(format!(
                "unknown reservation status '{other}'"
            ))),
        }
    }
}

/// Stock held for one product by one saga.
///
/// Name and pricing are captured when the stock is reserved, so a replayed
/// reservation reports what was actually held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRecord {
    pub saga_id: SagaId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
    pub discount: Discount,
    pub quantity: u32,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

impl ReservationRecord {
    /// Records `quantity` units of `product` held for a saga.
    pub fn hold(
        saga_id: &SagaId,
        order_id: &OrderId,
        product: &ProductStock,
        quantity: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            saga_id: saga_id.clone(),
            order_id: order_id.clone(),
            product_id: product.product_id.clone(),
            name: product.name.clone(),
            price: product.price,
            discount: product.discount,
            quantity,
            status: ReservationStatus::Reserved,
            created_at,
        }
    }

    /// Returns the line as priced at reservation time.
    pub fn line_item(&self) -> LineItem {
        LineItem {
            product_id: self.product_id.clone(),
            name: self.name.clone(),
            quantity: self.quantity,
            price: self.price,
            discount: self.discount,
        }
    }
}

/// Why a reservation was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationFailure {
    /// The command carried no lines.
    NoLines,
    /// A line asked for zero units.
    InvalidQuantity { product_id: ProductId },
    /// The product is not in the catalogue.
    ProductNotFound { product_id: ProductId },
    /// Not enough stock is available.
    InsufficientQuantity {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },
}

impl std::fmt::Display for ReservationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReservationFailure::NoLines => write!(f, "No products to reserve"),
            ReservationFailure::InvalidQuantity { product_id } => {
                write!(f, "Invalid quantity for product {product_id}")
            }
            ReservationFailure::ProductNotFound { product_id } => {
                write!(f, "Product not found: {product_id}")
            }
            ReservationFailure::InsufficientQuantity {
                product_id,
                requested,
                available,
            } => write!(
                f,
                "Insufficient quantity for product {product_id}: requested {requested}, available {available}"
            ),
        }
    }
}

/// Result of a reserve attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ReserveOutcome {
    /// Stock is held. `replayed` is set when the saga already held it and
    /// nothing was decremented by this call.
    Reserved { lines: Vec<LineItem>, replayed: bool },

    /// Nothing was reserved.
    Rejected(ReservationFailure),
}

impl ReserveOutcome {
    pub fn is_reserved(&self) -> bool {
        matches!(self, ReserveOutcome::Reserved { .. })
    }
}

/// Validates a batch and merges duplicate products, keeping first-seen order.
///
/// The merged demand is what the all-or-nothing stock check must see.
pub fn merge_lines(
    lines: &[ReservationLine],
) -> std::result::Result<Vec<ReservationLine>, ReservationFailure> {
    if lines.is_empty() {
        return Err(ReservationFailure::NoLines);
    }

    let mut merged: Vec<ReservationLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity == 0 {
            return Err(ReservationFailure::InvalidQuantity {
                product_id: line.product_id.clone(),
            });
        }
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(line.quantity);
            }
            None => merged.push(line.clone()),
        }
    }
    Ok(merged)
}

/// Checks a merged batch against current stock, reporting the first failing line.
pub fn first_shortfall<'a>(
    lines: &[ReservationLine],
    lookup: impl Fn(&ProductId) -> Option<&'a ProductStock>,
) -> Option<ReservationFailure> {
    lines.iter().find_map(|line| match lookup(&line.product_id) {
        None => Some(ReservationFailure::ProductNotFound {
            product_id: line.product_id.clone(),
        }),
        Some(stock) if stock.available_quantity < line.quantity => {
            Some(ReservationFailure::InsufficientQuantity {
                product_id: line.product_id.clone(),
                requested: line.quantity,
                available: stock.available_quantity,
            })
        }
        Some(_) => None,
    })
}
