//! Catalog product as seen by the order workflow.

use chrono::{DateTime, Utc};
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

/// A product owned by the catalog collaborator.
///
/// The order workflow reads name and price as snapshots and mutates `stock`
/// only through the store's atomic reserve/restore operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    /// Available units. Never negative.
    pub stock: u32,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(name: impl Into<String>, price: Money, stock: u32) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            price,
            stock,
            updated_at: Utc::now(),
        }
    }

    /// Returns true if `quantity` units are available.
    pub fn has_stock(&self, quantity: u32) -> bool {
        self.stock >= quantity
    }
}
