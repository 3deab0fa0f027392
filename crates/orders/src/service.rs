//! Order orchestration: placement, lifecycle transitions, and search.
//!
//! The service composes the persistence ports with the state machine, the
//! stock ledger, and the two retry profiles. Cache eviction is an explicit
//! call made immediately after each successful mutation — nothing is
//! intercepted implicitly.

use chrono::Utc;
use tracing::instrument;

use storefront_catalog::ProductId;
use storefront_core::{RecordId, UserId};
use storefront_customers::Customer;

use crate::error::{OrderError, OrderResult};
use crate::filter::OrderFilter;
use crate::ledger::StockLedger;
use crate::order::{Order, OrderId, OrderItem, OrderItemId, ShippingAddress};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::status::{plan_transition, OrderStatus, OrderStatusRecord, TransitionPlan};
use crate::store::{CacheInvalidator, CustomerStore, OrderStatusStore, OrderStore, Page, ProductStore};

/// Cached regions evicted by mutations.
const CACHE_ORDERS: &str = "orders";
const CACHE_PRODUCTS: &str = "products";
const CACHE_PAGINATED: &str = "paginated";

/// One requested line of a new order.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A placement request: what to order and where to ship it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OrderRequest {
    pub items: Vec<ItemRequest>,
    pub shipping: ShippingAddress,
}

/// Order-management service.
///
/// Generic over its ports so tests run against in-memory stores and
/// production wires Postgres + Redis without touching this code.
pub struct OrderService<O, P, S, C, K> {
    orders: O,
    products: P,
    statuses: S,
    customers: C,
    cache: K,
    ledger: StockLedger<P>,
    transition_policy: RetryPolicy,
}

impl<O, P, S, C, K> OrderService<O, P, S, C, K>
where
    O: OrderStore,
    P: ProductStore + Clone,
    S: OrderStatusStore,
    C: CustomerStore,
    K: CacheInvalidator,
{
    pub fn new(orders: O, products: P, statuses: S, customers: C, cache: K) -> Self {
        Self::with_policies(
            orders,
            products,
            statuses,
            customers,
            cache,
            RetryPolicy::status_transition(),
            RetryPolicy::stock_decrement(),
        )
    }

    pub fn with_policies(
        orders: O,
        products: P,
        statuses: S,
        customers: C,
        cache: K,
        transition_policy: RetryPolicy,
        decrement_policy: RetryPolicy,
    ) -> Self {
        let ledger = StockLedger::with_policy(products.clone(), decrement_policy);
        Self {
            orders,
            products,
            statuses,
            customers,
            cache,
            ledger,
            transition_policy,
        }
    }

    /// Place a new order for the customer owned by `owner`.
    ///
    /// Validates every requested line against the catalog (availability
    /// check only — nothing is reserved), snapshots unit prices, and
    /// persists the order with its items as one atomic unit in `pending`.
    #[instrument(skip(self, request), fields(owner = %owner))]
    pub fn place_order(&self, owner: UserId, request: OrderRequest) -> OrderResult<Order> {
        let customer = self.resolve_customer(owner)?;
        self.require_status(OrderStatus::Pending)?;

        let order_id = OrderId::new(RecordId::new());
        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let product = self
                .products
                .product(line.product_id)?
                .ok_or(OrderError::ProductNotFound(line.product_id))?;
            let stock = self
                .products
                .stock_level(line.product_id)?
                .ok_or(OrderError::ProductNotFound(line.product_id))?;

            if !stock.can_satisfy(line.quantity) {
                return Err(OrderError::InsufficientStock(line.product_id));
            }

            items.push(OrderItem {
                order_item_id: OrderItemId::new(RecordId::new()),
                order_id,
                product_id: line.product_id,
                quantity: line.quantity,
                price_at_purchase: product.price,
            });
        }

        let order = Order::place(
            order_id,
            customer.customer_id,
            request.shipping,
            items,
            Utc::now(),
        )?;
        self.orders.insert(&order)?;

        self.cache.invalidate(CACHE_ORDERS);
        self.cache.invalidate(CACHE_PAGINATED);

        tracing::info!(
            order = %order.order_id,
            customer = %order.customer_id,
            total_amount = order.total_amount,
            "order placed"
        );
        Ok(order)
    }

    /// Fetch one order with its items.
    pub fn get_order(&self, order_id: OrderId) -> OrderResult<Order> {
        self.orders
            .load(order_id)?
            .ok_or(OrderError::OrderNotFound(order_id))
    }

    /// All orders, newest first.
    pub fn list_orders(&self, page: Page) -> OrderResult<Vec<Order>> {
        Ok(self.orders.list(page)?)
    }

    /// Orders of the customer owned by `owner`, newest first.
    pub fn customer_orders(&self, owner: UserId, page: Page) -> OrderResult<Vec<Order>> {
        let customer = self.resolve_customer(owner)?;
        let filter = OrderFilter {
            customer_id: Some(customer.customer_id),
            ..OrderFilter::default()
        };
        Ok(self.orders.find(&filter.to_predicate(), page)?)
    }

    /// Filtered order search.
    ///
    /// An empty filter is routed to the unfiltered listing so the store
    /// skips predicate matching entirely.
    pub fn search_orders(&self, filter: &OrderFilter, page: Page) -> OrderResult<Vec<Order>> {
        if filter.is_empty() {
            return self.list_orders(page);
        }
        Ok(self.orders.find(&filter.to_predicate(), page)?)
    }

    /// Apply a status transition to an order.
    ///
    /// `processed` charges stock for every line item through the ledger;
    /// `cancelled` has no stock side effect. The whole transition runs under
    /// the coarse retry profile; each decrement additionally runs under the
    /// ledger's fine-grained profile.
    #[instrument(skip(self), fields(order = %order_id, target = %target))]
    pub fn update_status(&self, order_id: OrderId, target: OrderStatus) -> OrderResult<Order> {
        let result = run_with_retry(&self.transition_policy, || {
            self.apply_transition(order_id, target)
        });

        if result.is_ok() {
            // Processing changes stock, so product caches go stale too.
            self.cache.invalidate(CACHE_ORDERS);
            self.cache.invalidate(CACHE_PRODUCTS);
            self.cache.invalidate(CACHE_PAGINATED);
        }

        result
    }

    fn apply_transition(&self, order_id: OrderId, target: OrderStatus) -> OrderResult<Order> {
        let order = self
            .orders
            .load(order_id)?
            .ok_or(OrderError::OrderNotFound(order_id))?;

        match plan_transition(order.status, target)? {
            TransitionPlan::NoOp => Ok(order),
            TransitionPlan::Process => {
                self.require_status(OrderStatus::Processed)?;
                self.decrement_items(&order)?;
                let updated = self.orders.update_status(order_id, OrderStatus::Processed)?;
                tracing::info!(order = %order_id, "order processed");
                Ok(updated)
            }
            TransitionPlan::Cancel => {
                self.require_status(OrderStatus::Cancelled)?;
                let updated = self.orders.update_status(order_id, OrderStatus::Cancelled)?;
                tracing::info!(order = %order_id, "order cancelled");
                Ok(updated)
            }
        }
    }

    /// Charge stock for every line item, in on-order sequence.
    ///
    /// On the first failure, stock already taken by earlier items is
    /// returned before the error surfaces, so a failed transition never
    /// leaves a silent partial decrement behind.
    fn decrement_items(&self, order: &Order) -> OrderResult<()> {
        let mut decremented: Vec<&OrderItem> = Vec::new();

        for item in &order.items {
            match self
                .ledger
                .decrement_with_retry(order.order_id, item.product_id, item.quantity)
            {
                Ok(_) => decremented.push(item),
                Err(err) => {
                    self.release_decremented(order, &decremented);
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    fn release_decremented(&self, order: &Order, decremented: &[&OrderItem]) {
        for item in decremented.iter().rev() {
            if let Err(release_err) =
                self.ledger
                    .release_with_retry(order.order_id, item.product_id, item.quantity)
            {
                tracing::error!(
                    order = %order.order_id,
                    product = %item.product_id,
                    error = %release_err,
                    "failed to return stock after aborted transition; manual repair required"
                );
            }
        }
    }

    fn resolve_customer(&self, owner: UserId) -> OrderResult<Customer> {
        self.customers
            .find_by_owner(owner)?
            .ok_or(OrderError::CustomerNotFound(owner))
    }

    fn require_status(&self, name: OrderStatus) -> OrderResult<OrderStatusRecord> {
        match self.statuses.find_by_name(name)? {
            Some(record) => Ok(record),
            None => {
                tracing::error!(status = %name, "status catalog is missing a required entry");
                Err(OrderError::StatusNotConfigured(name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryCustomers, MemoryOrders, MemoryProducts, MemoryStatuses, RecordingCache};
    use std::sync::Arc;
    use std::time::Duration;

    type TestService = OrderService<
        Arc<MemoryOrders>,
        Arc<MemoryProducts>,
        Arc<MemoryStatuses>,
        Arc<MemoryCustomers>,
        Arc<RecordingCache>,
    >;

    struct Fixture {
        orders: Arc<MemoryOrders>,
        products: Arc<MemoryProducts>,
        customers: Arc<MemoryCustomers>,
        cache: Arc<RecordingCache>,
        service: TestService,
        owner: UserId,
    }

    fn fixture() -> Fixture {
        fixture_with_statuses(MemoryStatuses::seeded())
    }

    fn fixture_with_statuses(statuses: MemoryStatuses) -> Fixture {
        let orders = Arc::new(MemoryOrders::new());
        let products = Arc::new(MemoryProducts::new());
        let statuses = Arc::new(statuses);
        let customers = Arc::new(MemoryCustomers::new());
        let cache = Arc::new(RecordingCache::new());

        let owner = UserId::new();
        customers.add(owner);

        let service = OrderService::with_policies(
            orders.clone(),
            products.clone(),
            statuses,
            customers.clone(),
            cache.clone(),
            RetryPolicy::fixed(3, Duration::ZERO),
            RetryPolicy::fixed(5, Duration::ZERO),
        );

        Fixture {
            orders,
            products,
            customers,
            cache,
            service,
            owner,
        }
    }

    fn shipping() -> ShippingAddress {
        ShippingAddress {
            country: "Spain".to_string(),
            city: "Madrid".to_string(),
            postal_code: "28001".to_string(),
        }
    }

    fn request(items: Vec<ItemRequest>) -> OrderRequest {
        OrderRequest {
            items,
            shipping: shipping(),
        }
    }

    #[test]
    fn places_order_with_derived_total_and_price_snapshot() {
        let fx = fixture();
        let p1 = fx.products.add("Keyboard", 1000, 10);
        let p2 = fx.products.add("Mouse", 500, 10);

        let order = fx
            .service
            .place_order(
                fx.owner,
                request(vec![
                    ItemRequest { product_id: p1, quantity: 2 },
                    ItemRequest { product_id: p2, quantity: 1 },
                ]),
            )
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, 2500);
        assert_eq!(order.items[0].price_at_purchase, 1000);
        assert_eq!(order.items[1].price_at_purchase, 500);

        // Availability check only: nothing reserved at placement time.
        assert_eq!(fx.products.quantity(p1), 10);
        assert_eq!(fx.products.quantity(p2), 10);

        // Persisted atomically with its items.
        let stored = fx.orders.load(order.order_id).unwrap().unwrap();
        assert_eq!(stored.items.len(), 2);

        assert_eq!(fx.cache.patterns(), vec!["orders", "paginated"]);
    }

    #[test]
    fn placement_requires_a_customer_profile() {
        let fx = fixture();
        let p1 = fx.products.add("Keyboard", 1000, 10);

        let err = fx
            .service
            .place_order(
                UserId::new(),
                request(vec![ItemRequest { product_id: p1, quantity: 1 }]),
            )
            .unwrap_err();

        assert!(matches!(err, OrderError::CustomerNotFound(_)));
    }

    #[test]
    fn placement_rejects_unknown_products() {
        let fx = fixture();
        let missing = ProductId::new(RecordId::new());

        let err = fx
            .service
            .place_order(
                fx.owner,
                request(vec![ItemRequest { product_id: missing, quantity: 1 }]),
            )
            .unwrap_err();

        assert!(matches!(err, OrderError::ProductNotFound(_)));
    }

    #[test]
    fn placement_rejects_insufficient_stock() {
        let fx = fixture();
        let p1 = fx.products.add("Keyboard", 1000, 3);

        let err = fx
            .service
            .place_order(
                fx.owner,
                request(vec![ItemRequest { product_id: p1, quantity: 4 }]),
            )
            .unwrap_err();

        match err {
            OrderError::InsufficientStock(product) => assert_eq!(product, p1),
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(fx.products.quantity(p1), 3);
        assert!(fx.cache.patterns().is_empty());
    }

    #[test]
    fn placement_fails_loudly_when_pending_status_is_missing() {
        let fx = fixture_with_statuses(MemoryStatuses::without(OrderStatus::Pending));
        let p1 = fx.products.add("Keyboard", 1000, 10);

        let err = fx
            .service
            .place_order(
                fx.owner,
                request(vec![ItemRequest { product_id: p1, quantity: 1 }]),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            OrderError::StatusNotConfigured(OrderStatus::Pending)
        ));
    }

    #[test]
    fn get_order_surfaces_not_found() {
        let fx = fixture();
        let err = fx
            .service
            .get_order(OrderId::new(RecordId::new()))
            .unwrap_err();
        assert!(matches!(err, OrderError::OrderNotFound(_)));
    }

    #[test]
    fn processing_decrements_stock_per_item() {
        let fx = fixture();
        let p1 = fx.products.add("Keyboard", 1000, 10);
        let p2 = fx.products.add("Mouse", 500, 4);

        let order = fx
            .service
            .place_order(
                fx.owner,
                request(vec![
                    ItemRequest { product_id: p1, quantity: 2 },
                    ItemRequest { product_id: p2, quantity: 3 },
                ]),
            )
            .unwrap();

        let processed = fx
            .service
            .update_status(order.order_id, OrderStatus::Processed)
            .unwrap();

        assert_eq!(processed.status, OrderStatus::Processed);
        assert_eq!(fx.products.quantity(p1), 8);
        assert_eq!(fx.products.quantity(p2), 1);
    }

    #[test]
    fn processing_twice_charges_stock_once() {
        let fx = fixture();
        let p1 = fx.products.add("Keyboard", 1000, 10);

        let order = fx
            .service
            .place_order(
                fx.owner,
                request(vec![ItemRequest { product_id: p1, quantity: 2 }]),
            )
            .unwrap();

        fx.service
            .update_status(order.order_id, OrderStatus::Processed)
            .unwrap();
        let again = fx
            .service
            .update_status(order.order_id, OrderStatus::Processed)
            .unwrap();

        assert_eq!(again.status, OrderStatus::Processed);
        assert_eq!(fx.products.quantity(p1), 8);
    }

    #[test]
    fn failed_multi_item_processing_leaves_no_partial_decrement() {
        let fx = fixture();
        let p1 = fx.products.add("Keyboard", 1000, 10);
        let p2 = fx.products.add("Mouse", 500, 5);

        let order = fx
            .service
            .place_order(
                fx.owner,
                request(vec![
                    ItemRequest { product_id: p1, quantity: 2 },
                    ItemRequest { product_id: p2, quantity: 5 },
                ]),
            )
            .unwrap();

        // Someone else drains p2 between placement and processing.
        let level = fx.products.stock_level(p2).unwrap().unwrap();
        fx.products
            .write_stock(p2, 1, storefront_core::ExpectedVersion::Exact(level.version))
            .unwrap();

        let err = fx
            .service
            .update_status(order.order_id, OrderStatus::Processed)
            .unwrap_err();
        assert!(matches!(err, OrderError::InsufficientStock(_)));

        // First item's decrement was compensated; order still pending.
        assert_eq!(fx.products.quantity(p1), 10);
        assert_eq!(fx.products.quantity(p2), 1);
        let reloaded = fx.service.get_order(order.order_id).unwrap();
        assert_eq!(reloaded.status, OrderStatus::Pending);
    }

    #[test]
    fn cancelling_a_pending_order_leaves_stock_untouched() {
        let fx = fixture();
        let p1 = fx.products.add("Keyboard", 1000, 10);

        let order = fx
            .service
            .place_order(
                fx.owner,
                request(vec![ItemRequest { product_id: p1, quantity: 2 }]),
            )
            .unwrap();

        let cancelled = fx
            .service
            .update_status(order.order_id, OrderStatus::Cancelled)
            .unwrap();

        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(fx.products.quantity(p1), 10);
    }

    #[test]
    fn cancelling_a_non_pending_order_is_rejected() {
        let fx = fixture();
        let p1 = fx.products.add("Keyboard", 1000, 10);

        let order = fx
            .service
            .place_order(
                fx.owner,
                request(vec![ItemRequest { product_id: p1, quantity: 1 }]),
            )
            .unwrap();
        fx.service
            .update_status(order.order_id, OrderStatus::Processed)
            .unwrap();

        let err = fx
            .service
            .update_status(order.order_id, OrderStatus::Cancelled)
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidCancellation));
    }

    #[test]
    fn pending_is_not_a_valid_transition_target() {
        let fx = fixture();
        let p1 = fx.products.add("Keyboard", 1000, 10);

        let order = fx
            .service
            .place_order(
                fx.owner,
                request(vec![ItemRequest { product_id: p1, quantity: 1 }]),
            )
            .unwrap();

        let err = fx
            .service
            .update_status(order.order_id, OrderStatus::Pending)
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidStatusTransition { .. }));
    }

    #[test]
    fn transition_evicts_product_caches_too() {
        let fx = fixture();
        let p1 = fx.products.add("Keyboard", 1000, 10);

        let order = fx
            .service
            .place_order(
                fx.owner,
                request(vec![ItemRequest { product_id: p1, quantity: 1 }]),
            )
            .unwrap();
        fx.service
            .update_status(order.order_id, OrderStatus::Processed)
            .unwrap();

        assert_eq!(
            fx.cache.patterns(),
            vec!["orders", "paginated", "orders", "products", "paginated"]
        );
    }

    #[test]
    fn empty_filter_search_equals_unfiltered_listing() {
        let fx = fixture();
        let p1 = fx.products.add("Keyboard", 1000, 10);

        for _ in 0..3 {
            fx.service
                .place_order(
                    fx.owner,
                    request(vec![ItemRequest { product_id: p1, quantity: 1 }]),
                )
                .unwrap();
        }

        let listed = fx.service.list_orders(Page::default()).unwrap();
        let searched = fx
            .service
            .search_orders(&OrderFilter::default(), Page::default())
            .unwrap();

        assert_eq!(listed, searched);
        assert_eq!(listed.len(), 3);
    }

    #[test]
    fn search_filters_by_status_and_amount() {
        let fx = fixture();
        let cheap = fx.products.add("Sticker", 100, 100);
        let pricey = fx.products.add("Monitor", 20_000, 100);

        fx.service
            .place_order(
                fx.owner,
                request(vec![ItemRequest { product_id: cheap, quantity: 1 }]),
            )
            .unwrap();
        let big = fx
            .service
            .place_order(
                fx.owner,
                request(vec![ItemRequest { product_id: pricey, quantity: 1 }]),
            )
            .unwrap();

        let filter = OrderFilter {
            status: Some(OrderStatus::Pending),
            min_amount: Some(10_000),
            ..OrderFilter::default()
        };
        let found = fx.service.search_orders(&filter, Page::default()).unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].order_id, big.order_id);
    }

    #[test]
    fn customer_orders_requires_a_profile() {
        let fx = fixture();
        let err = fx
            .service
            .customer_orders(UserId::new(), Page::default())
            .unwrap_err();
        assert!(matches!(err, OrderError::CustomerNotFound(_)));
    }

    #[test]
    fn customer_orders_only_returns_that_customers_orders() {
        let fx = fixture();
        let p1 = fx.products.add("Keyboard", 1000, 10);

        let other_owner = UserId::new();
        fx.customers.add(other_owner);

        fx.service
            .place_order(
                fx.owner,
                request(vec![ItemRequest { product_id: p1, quantity: 1 }]),
            )
            .unwrap();
        fx.service
            .place_order(
                other_owner,
                request(vec![ItemRequest { product_id: p1, quantity: 1 }]),
            )
            .unwrap();

        let mine = fx
            .service
            .customer_orders(fx.owner, Page::default())
            .unwrap();
        assert_eq!(mine.len(), 1);
    }
}
