//! Product catalogue seeded into the ledger at start-up.

use std::path::Path;

use common::{Discount, Money};
use inventory::{LedgerStore, ProductStock};
use serde::Deserialize;

use crate::error::StartupError;

/// One product of the catalogue file.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub product_id: String,
    pub name: String,
    pub price_cents: i64,
    #[serde(default)]
    pub discount: f64,
    pub quantity: u32,
}

impl CatalogEntry {
    fn into_stock(self) -> Result<ProductStock, StartupError> {
        let discount = Discount::new(self.discount).map_err(|e| StartupError::CatalogEntry {
            product_id: self.product_id.clone(),
            reason: e.to_string(),
        })?;
        if self.price_cents < 0 {
            return Err(StartupError::CatalogEntry {
                product_id: self.product_id,
                reason: "price must not be negative".to_string(),
            });
        }
        Ok(ProductStock::new(
            self.product_id,
            self.name,
            Money::from_cents(self.price_cents),
            discount,
            self.quantity,
        ))
    }
}

/// Parses a JSON catalogue.
pub fn parse_catalog(json: &str) -> Result<Vec<ProductStock>, StartupError> {
    let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
    entries.into_iter().map(CatalogEntry::into_stock).collect()
}

/// Reads a catalogue file and upserts every product into the ledger.
pub async fn seed_catalog<L: LedgerStore + ?Sized>(
    store: &L,
    path: &Path,
) -> Result<usize, StartupError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| StartupError::CatalogRead {
            path: path.display().to_string(),
            source,
        })?;
    let products = parse_catalog(&json)?;
    let count = products.len();
    for product in products {
        store.upsert_product(product).await?;
    }
    tracing::info!(products = count, path = %path.display(), "catalogue seeded");
    Ok(count)
}
