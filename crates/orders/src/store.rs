//! Persistence and cache ports consumed by the order core.
//!
//! The core never talks to a database directly; it depends on these narrow,
//! synchronous contracts. Adapters (in-memory for tests/dev, Postgres for
//! production) live in `storefront-infra`.

use std::sync::Arc;

use thiserror::Error;

use storefront_catalog::{Product, ProductId, StockLevel};
use storefront_core::{ExpectedVersion, UserId};
use storefront_customers::Customer;

use crate::filter::OrderPredicate;
use crate::order::{Order, OrderId};
use crate::status::{OrderStatus, OrderStatusRecord};

/// Pagination parameters for listing queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Page {
    /// Maximum number of orders to return.
    pub limit: u32,
    /// Offset for pagination (0-based, in records).
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50, // Safe default
            offset: 0,
        }
    }
}

impl Page {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(1000), // Cap at 1000 for safety
            offset: offset.unwrap_or(0),
        }
    }
}

/// Store operation error.
///
/// These are **infrastructure-facing** failures; the service layer maps them
/// into the order taxonomy (`Conflict` on a stock write becomes the retryable
/// `StockConflict`).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Conditional write rejected: stored version no longer matches.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// A record the operation requires does not exist.
    #[error("missing record: {0}")]
    Missing(String),

    /// Backend failure (connection, serialization, poisoned lock, ...).
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Order persistence.
///
/// `insert` must persist the order together with its items as one atomic
/// unit: either both are visible afterwards or neither is. `find` and `list`
/// return orders sorted by order date descending.
pub trait OrderStore: Send + Sync {
    fn load(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Persist a new order and its owned items atomically.
    fn insert(&self, order: &Order) -> Result<(), StoreError>;

    /// Persist a status change and return the updated order.
    fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order, StoreError>;

    /// Orders matching `predicate`, newest order date first.
    fn find(&self, predicate: &OrderPredicate, page: Page) -> Result<Vec<Order>, StoreError>;

    /// All orders, newest order date first.
    fn list(&self, page: Page) -> Result<Vec<Order>, StoreError>;
}

/// Product catalog + stock persistence.
///
/// `write_stock` is the sole stock mutation path in the system: it applies
/// the new quantity only when the stored version still equals `expected`,
/// and bumps the version by exactly 1 on success. A mismatch returns
/// [`StoreError::Conflict`]; re-reading and retrying is the caller's job.
pub trait ProductStore: Send + Sync {
    fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    fn stock_level(&self, id: ProductId) -> Result<Option<StockLevel>, StoreError>;

    fn write_stock(
        &self,
        id: ProductId,
        new_quantity: i64,
        expected: ExpectedVersion,
    ) -> Result<StockLevel, StoreError>;
}

/// Status catalog persistence.
pub trait OrderStatusStore: Send + Sync {
    fn find_by_name(&self, name: OrderStatus) -> Result<Option<OrderStatusRecord>, StoreError>;
}

/// Customer lookup by authenticated owner.
pub trait CustomerStore: Send + Sync {
    fn find_by_owner(&self, owner: UserId) -> Result<Option<Customer>, StoreError>;
}

/// Cache invalidation hook invoked after successful mutations.
///
/// Fire-and-forget and best-effort: cached reads accelerate queries but are
/// never load-bearing for correctness, so failures here are not surfaced.
pub trait CacheInvalidator: Send + Sync {
    /// Drop cached entries whose keys start with `pattern`.
    fn invalidate(&self, pattern: &str);
}

impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    fn load(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).load(id)
    }

    fn insert(&self, order: &Order) -> Result<(), StoreError> {
        (**self).insert(order)
    }

    fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order, StoreError> {
        (**self).update_status(id, status)
    }

    fn find(&self, predicate: &OrderPredicate, page: Page) -> Result<Vec<Order>, StoreError> {
        (**self).find(predicate, page)
    }

    fn list(&self, page: Page) -> Result<Vec<Order>, StoreError> {
        (**self).list(page)
    }
}

impl<S> ProductStore for Arc<S>
where
    S: ProductStore + ?Sized,
{
    fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).product(id)
    }

    fn stock_level(&self, id: ProductId) -> Result<Option<StockLevel>, StoreError> {
        (**self).stock_level(id)
    }

    fn write_stock(
        &self,
        id: ProductId,
        new_quantity: i64,
        expected: ExpectedVersion,
    ) -> Result<StockLevel, StoreError> {
        (**self).write_stock(id, new_quantity, expected)
    }
}

impl<S> OrderStatusStore for Arc<S>
where
    S: OrderStatusStore + ?Sized,
{
    fn find_by_name(&self, name: OrderStatus) -> Result<Option<OrderStatusRecord>, StoreError> {
        (**self).find_by_name(name)
    }
}

impl<S> CustomerStore for Arc<S>
where
    S: CustomerStore + ?Sized,
{
    fn find_by_owner(&self, owner: UserId) -> Result<Option<Customer>, StoreError> {
        (**self).find_by_owner(owner)
    }
}

impl<S> CacheInvalidator for Arc<S>
where
    S: CacheInvalidator + ?Sized,
{
    fn invalidate(&self, pattern: &str) {
        (**self).invalidate(pattern)
    }
}
