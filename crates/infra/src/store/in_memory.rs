//! In-memory store adapters.
//!
//! Intended for tests/dev. The stock write applies its version check and the
//! update under one write lock, which makes it the linearization point the
//! optimistic contract needs; everything in between reads and writes runs
//! unlocked, exactly like the production adapter.

use std::collections::HashMap;
use std::sync::RwLock;

use storefront_catalog::{Product, ProductId, StockLevel};
use storefront_core::{ExpectedVersion, RecordId, UserId};
use storefront_customers::Customer;

use storefront_orders::{
    CustomerStore, Order, OrderId, OrderPredicate, OrderStatus, OrderStatusId, OrderStatusRecord,
    OrderStatusStore, OrderStore, Page, ProductStore, StoreError,
};

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

/// In-memory product + stock store.
#[derive(Debug, Default)]
pub struct InMemoryProductStore {
    records: RwLock<HashMap<ProductId, (Product, StockLevel)>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a product with its opening stock. The version token starts
    /// at 1 so a fresh read can always be distinguished from "never read".
    pub fn seed(&self, product: Product, quantity: i64) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.insert(product.product_id, (product, StockLevel::new(quantity, 1)));
        Ok(())
    }
}

impl ProductStore for InMemoryProductStore {
    fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(&id).map(|(product, _)| product.clone()))
    }

    fn stock_level(&self, id: ProductId) -> Result<Option<StockLevel>, StoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(&id).map(|(_, level)| *level))
    }

    fn write_stock(
        &self,
        id: ProductId,
        new_quantity: i64,
        expected: ExpectedVersion,
    ) -> Result<StockLevel, StoreError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let (_, level) = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::Missing(format!("product {id}")))?;

        if !expected.matches(level.version) {
            return Err(StoreError::Conflict(format!(
                "expected {expected:?}, found {}",
                level.version
            )));
        }

        *level = StockLevel::new(new_quantity, level.version + 1);
        Ok(*level)
    }
}

/// In-memory order store.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest order date first; ties broken by id so paging is stable.
    fn sorted(mut orders: Vec<Order>, page: Page) -> Vec<Order> {
        orders.sort_by(|a, b| {
            b.order_date
                .cmp(&a.order_date)
                .then_with(|| b.order_id.0.as_uuid().cmp(a.order_id.0.as_uuid()))
        });
        orders
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect()
    }
}

impl OrderStore for InMemoryOrderStore {
    fn load(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let orders = self.orders.read().map_err(|_| poisoned())?;
        Ok(orders.get(&id).cloned())
    }

    fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let mut orders = self.orders.write().map_err(|_| poisoned())?;
        if orders.contains_key(&order.order_id) {
            return Err(StoreError::Conflict(format!(
                "order {} already exists",
                order.order_id
            )));
        }
        // The order owns its items, so one map entry is the atomic unit.
        orders.insert(order.order_id, order.clone());
        Ok(())
    }

    fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order, StoreError> {
        let mut orders = self.orders.write().map_err(|_| poisoned())?;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::Missing(format!("order {id}")))?;
        order.status = status;
        Ok(order.clone())
    }

    fn find(&self, predicate: &OrderPredicate, page: Page) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().map_err(|_| poisoned())?;
        let matched = orders
            .values()
            .filter(|order| predicate.matches(order))
            .cloned()
            .collect();
        Ok(Self::sorted(matched, page))
    }

    fn list(&self, page: Page) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().map_err(|_| poisoned())?;
        Ok(Self::sorted(orders.values().cloned().collect(), page))
    }
}

/// In-memory status catalog.
#[derive(Debug, Default)]
pub struct InMemoryStatusStore {
    records: RwLock<HashMap<OrderStatus, OrderStatusRecord>>,
}

impl InMemoryStatusStore {
    /// An empty catalog; every lookup fails until rows are inserted.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog pre-populated with the three lifecycle statuses.
    pub fn seeded() -> Self {
        let mut records = HashMap::new();
        for (name, description) in [
            (OrderStatus::Pending, "awaiting processing"),
            (OrderStatus::Processed, "stock charged and fulfilled"),
            (OrderStatus::Cancelled, "cancelled before processing"),
        ] {
            records.insert(
                name,
                OrderStatusRecord {
                    status_id: OrderStatusId::new(RecordId::new()),
                    name,
                    description: description.to_string(),
                },
            );
        }
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn insert(&self, record: OrderStatusRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.insert(record.name, record);
        Ok(())
    }
}

impl OrderStatusStore for InMemoryStatusStore {
    fn find_by_name(&self, name: OrderStatus) -> Result<Option<OrderStatusRecord>, StoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(&name).cloned())
    }
}

/// In-memory customer directory, keyed by owning user.
#[derive(Debug, Default)]
pub struct InMemoryCustomerStore {
    customers: RwLock<HashMap<UserId, Customer>>,
}

impl InMemoryCustomerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, customer: Customer) -> Result<(), StoreError> {
        let mut customers = self.customers.write().map_err(|_| poisoned())?;
        customers.insert(customer.owner, customer);
        Ok(())
    }
}

impl CustomerStore for InMemoryCustomerStore {
    fn find_by_owner(&self, owner: UserId) -> Result<Option<Customer>, StoreError> {
        let customers = self.customers.read().map_err(|_| poisoned())?;
        Ok(customers.get(&owner).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn seed_product(store: &InMemoryProductStore, quantity: i64) -> ProductId {
        let product = Product::new(
            ProductId::new(RecordId::new()),
            "Widget",
            "",
            1000,
            Utc::now(),
        )
        .unwrap();
        let id = product.product_id;
        store.seed(product, quantity).unwrap();
        id
    }

    #[test]
    fn stock_write_checks_the_version() {
        let store = InMemoryProductStore::new();
        let id = seed_product(&store, 5);

        let level = store.stock_level(id).unwrap().unwrap();
        assert_eq!((level.quantity, level.version), (5, 1));

        let written = store
            .write_stock(id, 3, ExpectedVersion::Exact(1))
            .unwrap();
        assert_eq!((written.quantity, written.version), (3, 2));

        // A writer holding the old version is rejected.
        let err = store.write_stock(id, 2, ExpectedVersion::Exact(1)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Stock unchanged by the rejected write.
        let level = store.stock_level(id).unwrap().unwrap();
        assert_eq!((level.quantity, level.version), (3, 2));
    }

    #[test]
    fn any_version_skips_the_check() {
        let store = InMemoryProductStore::new();
        let id = seed_product(&store, 5);

        let written = store.write_stock(id, 9, ExpectedVersion::Any).unwrap();
        assert_eq!((written.quantity, written.version), (9, 2));
    }

    #[test]
    fn writing_unknown_product_is_missing() {
        let store = InMemoryProductStore::new();
        let err = store
            .write_stock(ProductId::new(RecordId::new()), 1, ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing(_)));
    }

    #[test]
    fn duplicate_order_insert_is_rejected() {
        use storefront_customers::CustomerId;
        use storefront_orders::{OrderItem, OrderItemId, ShippingAddress};

        let store = InMemoryOrderStore::new();
        let order_id = OrderId::new(RecordId::new());
        let order = Order::place(
            order_id,
            CustomerId::new(RecordId::new()),
            ShippingAddress {
                country: "Spain".to_string(),
                city: "Madrid".to_string(),
                postal_code: "28001".to_string(),
            },
            vec![OrderItem {
                order_item_id: OrderItemId::new(RecordId::new()),
                order_id,
                product_id: ProductId::new(RecordId::new()),
                quantity: 1,
                price_at_purchase: 100,
            }],
            Utc::now(),
        )
        .unwrap();

        store.insert(&order).unwrap();
        let err = store.insert(&order).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn seeded_status_catalog_has_all_lifecycle_rows() {
        let store = InMemoryStatusStore::seeded();
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processed,
            OrderStatus::Cancelled,
        ] {
            assert!(store.find_by_name(status).unwrap().is_some());
        }
    }

    #[test]
    fn empty_status_catalog_finds_nothing() {
        let store = InMemoryStatusStore::new();
        assert!(store.find_by_name(OrderStatus::Pending).unwrap().is_none());
    }
}
