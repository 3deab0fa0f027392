//! Test doubles for the persistence ports.
//!
//! Deliberately minimal: just enough behavior to drive the core through its
//! paths. The real adapters live in `storefront-infra`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use chrono::Utc;

use storefront_catalog::{Product, ProductId, StockLevel};
use storefront_core::{ExpectedVersion, RecordId, UserId};
use storefront_customers::{Customer, CustomerId};

use crate::filter::OrderPredicate;
use crate::order::{Order, OrderId};
use crate::status::{OrderStatus, OrderStatusId, OrderStatusRecord};
use crate::store::{
    CacheInvalidator, CustomerStore, OrderStatusStore, OrderStore, Page, ProductStore, StoreError,
};

/// Single-product store with injectable write conflicts.
pub(crate) struct FlakyProducts {
    product: Product,
    stock: Mutex<StockLevel>,
    fail_writes: AtomicU32,
    write_attempts: AtomicU32,
}

impl FlakyProducts {
    pub(crate) fn with_stock(quantity: i64, version: u64) -> Self {
        let product = Product::new(
            ProductId::new(RecordId::new()),
            "Widget",
            "test product",
            1000,
            Utc::now(),
        )
        .unwrap();

        Self {
            product,
            stock: Mutex::new(StockLevel::new(quantity, version)),
            fail_writes: AtomicU32::new(0),
            write_attempts: AtomicU32::new(0),
        }
    }

    pub(crate) fn product_id(&self) -> ProductId {
        self.product.product_id
    }

    /// Make the next `n` writes fail with a version conflict.
    pub(crate) fn fail_next_writes(&self, n: u32) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    pub(crate) fn write_attempts(&self) -> u32 {
        self.write_attempts.load(Ordering::SeqCst)
    }
}

impl ProductStore for FlakyProducts {
    fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok((id == self.product.product_id).then(|| self.product.clone()))
    }

    fn stock_level(&self, id: ProductId) -> Result<Option<StockLevel>, StoreError> {
        if id != self.product.product_id {
            return Ok(None);
        }
        Ok(Some(*self.stock.lock().unwrap()))
    }

    fn write_stock(
        &self,
        id: ProductId,
        new_quantity: i64,
        expected: ExpectedVersion,
    ) -> Result<StockLevel, StoreError> {
        if id != self.product.product_id {
            return Err(StoreError::Missing(format!("product {id}")));
        }

        self.write_attempts.fetch_add(1, Ordering::SeqCst);

        if self
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Conflict("injected conflict".to_string()));
        }

        let mut stock = self.stock.lock().unwrap();
        if !expected.matches(stock.version) {
            return Err(StoreError::Conflict(format!(
                "expected {expected:?}, found {}",
                stock.version
            )));
        }

        *stock = StockLevel::new(new_quantity, stock.version + 1);
        Ok(*stock)
    }
}

/// Multi-product store backed by a map; CAS under the same lock.
#[derive(Default)]
pub(crate) struct MemoryProducts {
    records: Mutex<HashMap<ProductId, (Product, StockLevel)>>,
}

impl MemoryProducts {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, name: &str, price: u64, quantity: i64) -> ProductId {
        let product = Product::new(
            ProductId::new(RecordId::new()),
            name,
            "",
            price,
            Utc::now(),
        )
        .unwrap();
        let id = product.product_id;
        self.records
            .lock()
            .unwrap()
            .insert(id, (product, StockLevel::new(quantity, 1)));
        id
    }

    pub(crate) fn quantity(&self, id: ProductId) -> i64 {
        self.records.lock().unwrap()[&id].1.quantity
    }
}

impl ProductStore for MemoryProducts {
    fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&id)
            .map(|(product, _)| product.clone()))
    }

    fn stock_level(&self, id: ProductId) -> Result<Option<StockLevel>, StoreError> {
        Ok(self.records.lock().unwrap().get(&id).map(|(_, level)| *level))
    }

    fn write_stock(
        &self,
        id: ProductId,
        new_quantity: i64,
        expected: ExpectedVersion,
    ) -> Result<StockLevel, StoreError> {
        let mut records = self.records.lock().unwrap();
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

/// Order store backed by a map; date-descending listing.
#[derive(Default)]
pub(crate) struct MemoryOrders {
    orders: Mutex<HashMap<OrderId, Order>>,
}

impl MemoryOrders {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl OrderStore for MemoryOrders {
    fn load(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.lock().unwrap().get(&id).cloned())
    }

    fn insert(&self, order: &Order) -> Result<(), StoreError> {
        self.orders
            .lock()
            .unwrap()
            .insert(order.order_id, order.clone());
        Ok(())
    }

    fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order, StoreError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::Missing(format!("order {id}")))?;
        order.status = status;
        Ok(order.clone())
    }

    fn find(&self, predicate: &OrderPredicate, page: Page) -> Result<Vec<Order>, StoreError> {
        let mut matched: Vec<Order> = self
            .orders
            .lock()
            .unwrap()
            .values()
            .filter(|order| predicate.matches(order))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.order_date.cmp(&a.order_date));
        Ok(matched
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    fn list(&self, page: Page) -> Result<Vec<Order>, StoreError> {
        let mut all: Vec<Order> = self.orders.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| b.order_date.cmp(&a.order_date));
        Ok(all
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }
}

/// Status catalog double, optionally missing entries.
pub(crate) struct MemoryStatuses {
    records: Vec<OrderStatusRecord>,
}

impl MemoryStatuses {
    pub(crate) fn seeded() -> Self {
        let records = [
            (OrderStatus::Pending, "awaiting processing"),
            (OrderStatus::Processed, "stock charged"),
            (OrderStatus::Cancelled, "cancelled before processing"),
        ]
        .into_iter()
        .map(|(name, description)| OrderStatusRecord {
            status_id: OrderStatusId::new(RecordId::new()),
            name,
            description: description.to_string(),
        })
        .collect();
        Self { records }
    }

    pub(crate) fn without(name: OrderStatus) -> Self {
        let mut statuses = Self::seeded();
        statuses.records.retain(|record| record.name != name);
        statuses
    }
}

impl OrderStatusStore for MemoryStatuses {
    fn find_by_name(&self, name: OrderStatus) -> Result<Option<OrderStatusRecord>, StoreError> {
        Ok(self
            .records
            .iter()
            .find(|record| record.name == name)
            .cloned())
    }
}

/// Customer directory double.
#[derive(Default)]
pub(crate) struct MemoryCustomers {
    customers: Mutex<Vec<Customer>>,
}

impl MemoryCustomers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, owner: UserId) -> CustomerId {
        let customer = Customer::new(
            CustomerId::new(RecordId::new()),
            owner,
            "Test Customer",
            "customer@example.com",
            Utc::now(),
        )
        .unwrap();
        let id = customer.customer_id;
        self.customers.lock().unwrap().push(customer);
        id
    }
}

impl CustomerStore for MemoryCustomers {
    fn find_by_owner(&self, owner: UserId) -> Result<Option<Customer>, StoreError> {
        Ok(self
            .customers
            .lock()
            .unwrap()
            .iter()
            .find(|customer| customer.owner == owner)
            .cloned())
    }
}

/// Cache double that records invalidated patterns.
#[derive(Default)]
pub(crate) struct RecordingCache {
    invalidations: Mutex<Vec<String>>,
}

impl RecordingCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn patterns(&self) -> Vec<String> {
        self.invalidations.lock().unwrap().clone()
    }
}

impl CacheInvalidator for RecordingCache {
    fn invalidate(&self, pattern: &str) {
        self.invalidations.lock().unwrap().push(pattern.to_string());
    }
}
