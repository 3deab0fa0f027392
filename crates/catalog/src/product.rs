use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult, Entity, RecordId};

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub RecordId);

impl ProductId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Catalog product record.
///
/// Value-shaped: loaded from and written to the product store as a whole.
/// Stock is deliberately NOT part of this record; it lives in [`crate::StockLevel`]
/// behind the version-checked write contract, so reading a product never
/// pins a stale stock observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    /// Unit price in smallest currency unit (e.g., cents).
    pub price: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Build a validated product record.
    pub fn new(
        product_id: ProductId,
        name: impl Into<String>,
        description: impl Into<String>,
        price: u64,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if price == 0 {
            return Err(DomainError::validation("price must be positive"));
        }

        Ok(Self {
            product_id,
            name,
            description: description.into(),
            price,
            created_at: now,
            updated_at: now,
        })
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.product_id
    }
}
