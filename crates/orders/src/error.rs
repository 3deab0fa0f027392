//! Order module error taxonomy.

use thiserror::Error;

use storefront_catalog::ProductId;
use storefront_core::{DomainError, UserId};

use crate::order::OrderId;
use crate::status::OrderStatus;
use crate::store::StoreError;

/// Result type used across the order module.
pub type OrderResult<T> = Result<T, OrderError>;

/// Order module error.
///
/// Variants fall into four classes with distinct handling:
/// - **not-found** (`OrderNotFound`, `ProductNotFound`, `CustomerNotFound`):
///   bad identifier from the caller, surfaced as a client error, never retried.
/// - **validation** (`InsufficientStock`, `InvalidStatusTransition`,
///   `InvalidCancellation`): business-rule violation, surfaced with the
///   offending identifier/rule, never retried.
/// - **concurrency** (`StockConflict` retryable, `StockConflictExhausted`
///   terminal): `StockConflict` is caught and retried inside the module and
///   must never leak on a success path; exhaustion names product and order
///   and terminates the enclosing transition.
/// - **configuration** (`StatusNotConfigured`): a required status-catalog row
///   is missing — a deployment defect, not a per-request condition.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order {0} does not exist")]
    OrderNotFound(OrderId),

    #[error("product {0} does not exist")]
    ProductNotFound(ProductId),

    #[error("no customer profile for user {0}")]
    CustomerNotFound(UserId),

    #[error("insufficient stock for product {0}")]
    InsufficientStock(ProductId),

    #[error("transition to status '{target}' is not allowed")]
    InvalidStatusTransition { target: OrderStatus },

    #[error("only pending orders can be cancelled")]
    InvalidCancellation,

    #[error("stock write conflict for product {0}")]
    StockConflict(ProductId),

    #[error("stock conflict budget exhausted for product {product} while processing order {order}")]
    StockConflictExhausted { product: ProductId, order: OrderId },

    #[error("order status '{0}' is missing from the status catalog")]
    StatusNotConfigured(OrderStatus),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrderError {
    /// Only transient concurrency conflicts are worth retrying; every other
    /// variant is deterministic for a given state of the world.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrderError::StockConflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_core::RecordId;

    #[test]
    fn only_stock_conflict_is_retryable() {
        let product = ProductId::new(RecordId::new());
        let order = OrderId::new(RecordId::new());

        assert!(OrderError::StockConflict(product).is_retryable());
        assert!(!OrderError::InsufficientStock(product).is_retryable());
        assert!(!OrderError::StockConflictExhausted { product, order }.is_retryable());
        assert!(!OrderError::OrderNotFound(order).is_retryable());
        assert!(!OrderError::InvalidCancellation.is_retryable());
    }
}
