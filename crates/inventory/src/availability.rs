//! Synchronous availability check.
//!
//! Read-only: reports what could be reserved right now, judged against
//! available (not total) stock.

use async_trait::async_trait;
use common::{Discount, Money, ProductId};
use event_channel::ReservationLine;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::model::ProductStock;

/// A product that can satisfy the requested quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableProduct {
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
    pub discount: Discount,
    pub available_quantity: u32,
}

/// Why a product cannot be ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnavailableReason {
    NotFound,
    InsufficientQuantity,
}

/// A product that cannot satisfy the requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailableProduct {
    pub product_id: ProductId,
    pub reason: UnavailableReason,
    pub requested_quantity: u32,
    pub available_quantity: u32,
}

/// The two partitions of an availability check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityReport {
    pub available: Vec<AvailableProduct>,
    pub unavailable: Vec<UnavailableProduct>,
}

impl AvailabilityReport {
    /// Partitions the requested lines against the given stock.
    pub fn evaluate(lines: &[ReservationLine], stock: &[ProductStock]) -> Self {
        let mut report = Self::default();
        for line in lines {
            match stock.iter().find(|s| s.product_id == line.product_id) {
                None => report.unavailable.push(UnavailableProduct {
                    product_id: line.product_id.clone(),
                    reason: UnavailableReason::NotFound,
                    requested_quantity: line.quantity,
                    available_quantity: 0,
                }),
                Some(s) if s.available_quantity < line.quantity => {
                    report.unavailable.push(UnavailableProduct {
                        product_id: line.product_id.clone(),
                        reason: UnavailableReason::InsufficientQuantity,
                        requested_quantity: line.quantity,
                        available_quantity: s.available_quantity,
                    })
                }
                Some(s) => report.available.push(AvailableProduct {
                    product_id: s.product_id.clone(),
                    name: s.name.clone(),
                    price: s.price,
                    discount: s.discount,
                    available_quantity: s.available_quantity,
                }),
            }
        }
        report
    }

    /// Returns true when nothing was reported unavailable.
    pub fn all_available(&self) -> bool {
        self.unavailable.is_empty()
    }
}

/// Answers "can these quantities be reserved right now".
#[async_trait]
pub trait AvailabilityChecker: Send + Sync {
    async fn check_availability(&self, lines: &[ReservationLine]) -> Result<AvailabilityReport>;
}

#[async_trait]
impl<A: AvailabilityChecker + ?Sized> AvailabilityChecker for std::sync::Arc<A> {
    async fn check_availability(&self, lines: &[ReservationLine]) -> Result<AvailabilityReport> {
        (**self).check_availability(lines).await
    }
}
