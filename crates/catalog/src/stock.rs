use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult, ValueObject};

/// A product's stock observation: quantity on hand plus the version token
/// under which it was read.
///
/// The version token is the concurrency-control primitive: every successful
/// stock write bumps it by exactly 1, and a writer must present the version
/// it read. Quantity never goes below zero; candidate quantities are computed
/// here and rejected before any write is attempted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub quantity: i64,
    pub version: u64,
}

impl StockLevel {
    pub fn new(quantity: i64, version: u64) -> Self {
        Self { quantity, version }
    }

    /// Whether this observation can satisfy a request for `quantity` units.
    pub fn can_satisfy(&self, quantity: u32) -> bool {
        self.quantity >= i64::from(quantity)
    }

    /// Candidate quantity after removing `quantity` units.
    pub fn decremented(&self, quantity: u32) -> DomainResult<i64> {
        let new_quantity = self.quantity - i64::from(quantity);
        if new_quantity < 0 {
            return Err(DomainError::invariant("stock cannot go negative"));
        }
        Ok(new_quantity)
    }

    /// Candidate quantity after returning `quantity` units (compensation).
    pub fn incremented(&self, quantity: u32) -> i64 {
        self.quantity + i64::from(quantity)
    }
}

impl ValueObject for StockLevel {}
