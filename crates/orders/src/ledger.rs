//! Version-checked stock mutation.
//!
//! Reads are separate from writes: the ledger reads `(quantity, version)`,
//! computes the candidate quantity, and submits a conditional write carrying
//! the version it read. There is no lock held across that gap — correctness
//! comes from the version check plus bounded retry, not from blocking.

use storefront_catalog::{ProductId, StockLevel};
use storefront_core::ExpectedVersion;

use crate::error::{OrderError, OrderResult};
use crate::order::OrderId;
use crate::retry::{run_with_retry, RetryPolicy};
use crate::store::{ProductStore, StoreError};

/// The sole stock mutation path.
///
/// Wraps a [`ProductStore`] with the read–compute–conditional-write cycle
/// and the fine-grained retry profile. No other component may write stock
/// quantities.
#[derive(Debug)]
pub struct StockLedger<P> {
    products: P,
    policy: RetryPolicy,
}

impl<P> StockLedger<P>
where
    P: ProductStore,
{
    pub fn new(products: P) -> Self {
        Self::with_policy(products, RetryPolicy::stock_decrement())
    }

    pub fn with_policy(products: P, policy: RetryPolicy) -> Self {
        Self { products, policy }
    }

    /// Read the current stock observation for `product_id`.
    pub fn read(&self, product_id: ProductId) -> OrderResult<StockLevel> {
        self.products
            .stock_level(product_id)?
            .ok_or(OrderError::ProductNotFound(product_id))
    }

    /// Attempt one conditional decrement against the `observed` level.
    ///
    /// Fails with `InsufficientStock` if the observation cannot satisfy the
    /// request, and with the retryable `StockConflict` if another writer got
    /// in between the read and this write. On success the returned level
    /// carries the stored quantity and a version bumped by exactly 1.
    pub fn decrement(
        &self,
        product_id: ProductId,
        quantity: u32,
        observed: StockLevel,
    ) -> OrderResult<StockLevel> {
        if !observed.can_satisfy(quantity) {
            return Err(OrderError::InsufficientStock(product_id));
        }
        let candidate = observed.decremented(quantity)?;

        self.write(product_id, candidate, observed.version)
    }

    /// Re-read and decrement under the retry profile.
    ///
    /// `InsufficientStock` surfaces immediately (a smaller stock observed on
    /// re-read is a fact, not a race). An exhausted conflict budget becomes
    /// the terminal [`OrderError::StockConflictExhausted`] naming both the
    /// product and the order being processed.
    pub fn decrement_with_retry(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
    ) -> OrderResult<StockLevel> {
        let result = run_with_retry(&self.policy, || {
            let observed = self.read(product_id)?;
            self.decrement(product_id, quantity, observed)
        });

        self.escalate_exhaustion(result, order_id)
    }

    /// Return `quantity` units to `product_id` (compensation for a failed
    /// multi-item transition), under the same retry profile.
    pub fn release_with_retry(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
    ) -> OrderResult<StockLevel> {
        let result = run_with_retry(&self.policy, || {
            let observed = self.read(product_id)?;
            self.write(product_id, observed.incremented(quantity), observed.version)
        });

        self.escalate_exhaustion(result, order_id)
    }

    fn write(
        &self,
        product_id: ProductId,
        new_quantity: i64,
        read_version: u64,
    ) -> OrderResult<StockLevel> {
        match self.products.write_stock(
            product_id,
            new_quantity,
            ExpectedVersion::Exact(read_version),
        ) {
            Ok(level) => Ok(level),
            Err(StoreError::Conflict(_)) => Err(OrderError::StockConflict(product_id)),
            Err(err) => Err(err.into()),
        }
    }

    fn escalate_exhaustion(
        &self,
        result: OrderResult<StockLevel>,
        order_id: OrderId,
    ) -> OrderResult<StockLevel> {
        match result {
            Err(OrderError::StockConflict(product)) => {
                tracing::warn!(
                    product = %product,
                    order = %order_id,
                    max_attempts = self.policy.max_attempts,
                    "stock conflict budget exhausted"
                );
                Err(OrderError::StockConflictExhausted {
                    product,
                    order: order_id,
                })
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FlakyProducts;
    use std::sync::Arc;
    use std::time::Duration;
    use storefront_core::RecordId;

    fn test_order_id() -> OrderId {
        OrderId::new(RecordId::new())
    }

    fn immediate(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(max_attempts, Duration::ZERO)
    }

    #[test]
    fn decrement_updates_quantity_and_bumps_version() {
        let products = Arc::new(FlakyProducts::with_stock(5, 1));
        let product_id = products.product_id();
        let ledger = StockLedger::with_policy(products.clone(), immediate(5));

        let observed = ledger.read(product_id).unwrap();
        let level = ledger.decrement(product_id, 3, observed).unwrap();

        assert_eq!(level.quantity, 2);
        assert_eq!(level.version, 2);
    }

    #[test]
    fn unknown_product_is_not_found() {
        let products = Arc::new(FlakyProducts::with_stock(5, 1));
        let ledger = StockLedger::with_policy(products.clone(), immediate(5));
        let missing = ProductId::new(RecordId::new());

        let err = ledger.read(missing).unwrap_err();
        assert!(matches!(err, OrderError::ProductNotFound(_)));
    }

    #[test]
    fn stale_version_yields_retryable_conflict() {
        let products = Arc::new(FlakyProducts::with_stock(5, 1));
        let product_id = products.product_id();
        let ledger = StockLedger::with_policy(products.clone(), immediate(5));

        let observed = ledger.read(product_id).unwrap();
        // Another writer lands in between.
        ledger.decrement(product_id, 1, observed).unwrap();

        let err = ledger.decrement(product_id, 1, observed).unwrap_err();
        assert!(matches!(err, OrderError::StockConflict(_)));
    }

    #[test]
    fn retry_recovers_from_transient_conflicts() {
        let products = Arc::new(FlakyProducts::with_stock(5, 1));
        products.fail_next_writes(2);
        let product_id = products.product_id();
        let ledger = StockLedger::with_policy(products.clone(), immediate(5));

        let level = ledger
            .decrement_with_retry(test_order_id(), product_id, 3)
            .unwrap();

        assert_eq!(level.quantity, 2);
        assert_eq!(products.write_attempts(), 3);
    }

    #[test]
    fn exhausted_conflicts_become_terminal() {
        let products = Arc::new(FlakyProducts::with_stock(5, 1));
        products.fail_next_writes(10);
        let product_id = products.product_id();
        let order_id = test_order_id();
        let ledger = StockLedger::with_policy(products.clone(), immediate(3));

        let err = ledger
            .decrement_with_retry(order_id, product_id, 1)
            .unwrap_err();

        match err {
            OrderError::StockConflictExhausted { product, order } => {
                assert_eq!(product, product_id);
                assert_eq!(order, order_id);
            }
            other => panic!("expected StockConflictExhausted, got {other:?}"),
        }
        assert_eq!(products.write_attempts(), 3);
    }

    #[test]
    fn insufficient_stock_is_not_retried() {
        let products = Arc::new(FlakyProducts::with_stock(2, 1));
        let product_id = products.product_id();
        let ledger = StockLedger::with_policy(products.clone(), immediate(5));

        let err = ledger
            .decrement_with_retry(test_order_id(), product_id, 3)
            .unwrap_err();

        assert!(matches!(err, OrderError::InsufficientStock(_)));
        assert_eq!(products.write_attempts(), 0);

        // Stock untouched.
        assert_eq!(ledger.read(product_id).unwrap().quantity, 2);
    }

    #[test]
    fn release_returns_units() {
        let products = Arc::new(FlakyProducts::with_stock(5, 1));
        let product_id = products.product_id();
        let order_id = test_order_id();
        let ledger = StockLedger::with_policy(products.clone(), immediate(5));

        ledger.decrement_with_retry(order_id, product_id, 4).unwrap();
        let level = ledger.release_with_retry(order_id, product_id, 4).unwrap();

        assert_eq!(level.quantity, 5);
        assert_eq!(level.version, 3);
    }
}
