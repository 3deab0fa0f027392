//! Postgres-backed store adapters.
//!
//! Expected schema (one table per record kind):
//!
//! - `orders(order_id uuid pk, customer_id uuid, status text, order_date
//!   timestamptz, total_amount bigint, shipping_country text, shipping_city
//!   text, shipping_postal_code text)`
//! - `order_items(order_item_id uuid pk, order_id uuid, product_id uuid,
//!   quantity int, price_at_purchase bigint)`
//! - `products(product_id uuid pk, name text, description text, price
//!   bigint, created_at timestamptz, updated_at timestamptz)`
//! - `product_stock(product_id uuid pk, quantity bigint, version bigint)`
//! - `order_statuses(status_id uuid pk, status_name text unique, description text)`
//! - `customers(customer_id uuid pk, owner_id uuid unique, name text,
//!   email text, created_at timestamptz)`
//!
//! ## Optimistic concurrency
//!
//! The stock write is a single conditional `UPDATE`:
//!
//! ```sql
//! UPDATE product_stock
//!    SET quantity = $2, version = version + 1
//!  WHERE product_id = $1 AND version = $3
//! ```
//!
//! Zero rows affected means another writer bumped the version since the
//! caller's read; that maps to [`StoreError::Conflict`] and the caller
//! re-reads and retries. The database row is the linearization point — no
//! application-side lock is held across the read–write gap.
//!
//! ## Error mapping
//!
//! | Situation                               | StoreError  |
//! |-----------------------------------------|-------------|
//! | Conditional update matched zero rows    | `Conflict`  |
//! | Target row does not exist               | `Missing`   |
//! | Any sqlx error (connection, decode, ...)| `Backend`   |
//!
//! ## Threading
//!
//! The ports are synchronous (the core runs request-per-invocation); these
//! adapters bridge onto sqlx by entering the ambient tokio runtime with
//! `Handle::block_on`, so they must be called from a thread that can block.

use std::sync::Arc;

use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::instrument;

use storefront_catalog::{Product, ProductId, StockLevel};
use storefront_core::{ExpectedVersion, RecordId, UserId};
use storefront_customers::{Customer, CustomerId};

use storefront_orders::{
    CustomerStore, FilterFragment, Order, OrderId, OrderItem, OrderItemId, OrderPredicate,
    OrderStatus, OrderStatusId, OrderStatusRecord, OrderStatusStore, OrderStore, Page,
    ProductStore, ShippingAddress, StoreError,
};

fn runtime() -> Result<tokio::runtime::Handle, StoreError> {
    tokio::runtime::Handle::try_current()
        .map_err(|e| StoreError::Backend(format!("no tokio runtime available: {e}")))
}

fn backend(operation: &str, err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("{operation}: {err}"))
}

fn decode(operation: &str, err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("{operation}: failed to decode row: {err}"))
}

/// Postgres-backed product + stock store.
#[derive(Debug, Clone)]
pub struct PostgresProductStore {
    pool: Arc<PgPool>,
}

impl PostgresProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

impl ProductStore for PostgresProductStore {
    fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let handle = runtime()?;
        let pool = self.pool.clone();

        handle.block_on(async move {
            let row = sqlx::query(
                r#"
                SELECT product_id, name, description, price, created_at, updated_at
                FROM products
                WHERE product_id = $1
                "#,
            )
            .bind(id.0.as_uuid())
            .fetch_optional(&*pool)
            .await
            .map_err(|e| backend("product", e))?;

            row.map(|row| {
                Ok(Product {
                    product_id: ProductId::new(RecordId::from_uuid(
                        row.try_get("product_id").map_err(|e| decode("product", e))?,
                    )),
                    name: row.try_get("name").map_err(|e| decode("product", e))?,
                    description: row
                        .try_get("description")
                        .map_err(|e| decode("product", e))?,
                    price: row
                        .try_get::<i64, _>("price")
                        .map_err(|e| decode("product", e))? as u64,
                    created_at: row
                        .try_get("created_at")
                        .map_err(|e| decode("product", e))?,
                    updated_at: row
                        .try_get("updated_at")
                        .map_err(|e| decode("product", e))?,
                })
            })
            .transpose()
        })
    }

    fn stock_level(&self, id: ProductId) -> Result<Option<StockLevel>, StoreError> {
        let handle = runtime()?;
        let pool = self.pool.clone();

        handle.block_on(async move {
            let row = sqlx::query(
                "SELECT quantity, version FROM product_stock WHERE product_id = $1",
            )
            .bind(id.0.as_uuid())
            .fetch_optional(&*pool)
            .await
            .map_err(|e| backend("stock_level", e))?;

            row.map(|row| {
                let quantity: i64 = row
                    .try_get("quantity")
                    .map_err(|e| decode("stock_level", e))?;
                let version: i64 = row
                    .try_get("version")
                    .map_err(|e| decode("stock_level", e))?;
                Ok(StockLevel::new(quantity, version as u64))
            })
            .transpose()
        })
    }

    #[instrument(skip(self), fields(product = %id, new_quantity, ?expected))]
    fn write_stock(
        &self,
        id: ProductId,
        new_quantity: i64,
        expected: ExpectedVersion,
    ) -> Result<StockLevel, StoreError> {
        let handle = runtime()?;
        let pool = self.pool.clone();

        handle.block_on(async move {
            let updated = match expected {
                ExpectedVersion::Exact(version) => sqlx::query(
                    r#"
                    UPDATE product_stock
                       SET quantity = $2, version = version + 1
                     WHERE product_id = $1 AND version = $3
                    RETURNING quantity, version
                    "#,
                )
                .bind(id.0.as_uuid())
                .bind(new_quantity)
                .bind(version as i64)
                .fetch_optional(&*pool)
                .await
                .map_err(|e| backend("write_stock", e))?,
                ExpectedVersion::Any => sqlx::query(
                    r#"
                    UPDATE product_stock
                       SET quantity = $2, version = version + 1
                     WHERE product_id = $1
                    RETURNING quantity, version
                    "#,
                )
                .bind(id.0.as_uuid())
                .bind(new_quantity)
                .fetch_optional(&*pool)
                .await
                .map_err(|e| backend("write_stock", e))?,
            };

            if let Some(row) = updated {
                let quantity: i64 = row
                    .try_get("quantity")
                    .map_err(|e| decode("write_stock", e))?;
                let version: i64 = row
                    .try_get("version")
                    .map_err(|e| decode("write_stock", e))?;
                return Ok(StockLevel::new(quantity, version as u64));
            }

            // Zero rows: either the row is gone or the version moved.
            let exists = sqlx::query("SELECT 1 FROM product_stock WHERE product_id = $1")
                .bind(id.0.as_uuid())
                .fetch_optional(&*pool)
                .await
                .map_err(|e| backend("write_stock", e))?
                .is_some();

            if exists {
                Err(StoreError::Conflict(format!(
                    "stock version moved past {expected:?} for product {id}"
                )))
            } else {
                Err(StoreError::Missing(format!("product {id}")))
            }
        })
    }
}

/// Postgres-backed order store.
#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: Arc<PgPool>,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn items_for(pool: &PgPool, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT order_item_id, order_id, product_id, quantity, price_at_purchase
            FROM order_items
            WHERE order_id = $1
            ORDER BY order_item_id
            "#,
        )
        .bind(order_id.0.as_uuid())
        .fetch_all(pool)
        .await
        .map_err(|e| backend("items_for", e))?;

        rows.into_iter()
            .map(|row| {
                Ok(OrderItem {
                    order_item_id: OrderItemId::new(RecordId::from_uuid(
                        row.try_get("order_item_id")
                            .map_err(|e| decode("items_for", e))?,
                    )),
                    order_id: OrderId::new(RecordId::from_uuid(
                        row.try_get("order_id").map_err(|e| decode("items_for", e))?,
                    )),
                    product_id: ProductId::new(RecordId::from_uuid(
                        row.try_get("product_id")
                            .map_err(|e| decode("items_for", e))?,
                    )),
                    quantity: row
                        .try_get::<i32, _>("quantity")
                        .map_err(|e| decode("items_for", e))? as u32,
                    price_at_purchase: row
                        .try_get::<i64, _>("price_at_purchase")
                        .map_err(|e| decode("items_for", e))? as u64,
                })
            })
            .collect()
    }

    async fn order_from_row(pool: &PgPool, row: sqlx::postgres::PgRow) -> Result<Order, StoreError> {
        let order_id = OrderId::new(RecordId::from_uuid(
            row.try_get("order_id")
                .map_err(|e| decode("order_from_row", e))?,
        ));
        let status: String = row
            .try_get("status")
            .map_err(|e| decode("order_from_row", e))?;
        let status = status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Backend(format!("order {order_id}: {e}")))?;

        Ok(Order {
            order_id,
            customer_id: CustomerId::new(RecordId::from_uuid(
                row.try_get("customer_id")
                    .map_err(|e| decode("order_from_row", e))?,
            )),
            status,
            order_date: row
                .try_get("order_date")
                .map_err(|e| decode("order_from_row", e))?,
            total_amount: row
                .try_get::<i64, _>("total_amount")
                .map_err(|e| decode("order_from_row", e))? as u64,
            shipping: ShippingAddress {
                country: row
                    .try_get("shipping_country")
                    .map_err(|e| decode("order_from_row", e))?,
                city: row
                    .try_get("shipping_city")
                    .map_err(|e| decode("order_from_row", e))?,
                postal_code: row
                    .try_get("shipping_postal_code")
                    .map_err(|e| decode("order_from_row", e))?,
            },
            items: Self::items_for(pool, order_id).await?,
        })
    }

    fn push_fragments(builder: &mut QueryBuilder<'_, Postgres>, predicate: &OrderPredicate) {
        for fragment in predicate.fragments() {
            match fragment {
                FilterFragment::CustomerEquals(customer_id) => {
                    builder.push(" AND customer_id = ");
                    builder.push_bind(*customer_id.0.as_uuid());
                }
                FilterFragment::StatusEquals(status) => {
                    builder.push(" AND status = ");
                    builder.push_bind(status.as_str());
                }
                FilterFragment::OrderedOnOrAfter(min) => {
                    builder.push(" AND order_date >= ");
                    builder.push_bind(*min);
                }
                FilterFragment::OrderedOnOrBefore(max) => {
                    builder.push(" AND order_date <= ");
                    builder.push_bind(*max);
                }
                FilterFragment::AmountAtLeast(min) => {
                    builder.push(" AND total_amount >= ");
                    builder.push_bind(*min as i64);
                }
                FilterFragment::AmountAtMost(max) => {
                    builder.push(" AND total_amount <= ");
                    builder.push_bind(*max as i64);
                }
                FilterFragment::CountryEquals(country) => {
                    builder.push(" AND lower(shipping_country) = ");
                    builder.push_bind(country.clone());
                }
                FilterFragment::CityContains(city) => {
                    builder.push(" AND lower(shipping_city) LIKE ");
                    builder.push_bind(format!("%{city}%"));
                }
            }
        }
    }
}

const SELECT_ORDER: &str = "SELECT order_id, customer_id, status, order_date, total_amount, \
     shipping_country, shipping_city, shipping_postal_code FROM orders";

impl OrderStore for PostgresOrderStore {
    fn load(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let handle = runtime()?;
        let pool = self.pool.clone();

        handle.block_on(async move {
            let row = sqlx::query(&format!("{SELECT_ORDER} WHERE order_id = $1"))
                .bind(id.0.as_uuid())
                .fetch_optional(&*pool)
                .await
                .map_err(|e| backend("load", e))?;

            match row {
                Some(row) => Ok(Some(Self::order_from_row(&pool, row).await?)),
                None => Ok(None),
            }
        })
    }

    /// Order row + item rows inside one transaction: both visible or neither.
    #[instrument(skip(self, order), fields(order = %order.order_id, items = order.items.len()))]
    fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let handle = runtime()?;
        let pool = self.pool.clone();
        let order = order.clone();

        handle.block_on(async move {
            let mut tx = pool.begin().await.map_err(|e| backend("insert", e))?;

            sqlx::query(
                r#"
                INSERT INTO orders (
                    order_id, customer_id, status, order_date, total_amount,
                    shipping_country, shipping_city, shipping_postal_code
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(order.order_id.0.as_uuid())
            .bind(order.customer_id.0.as_uuid())
            .bind(order.status.as_str())
            .bind(order.order_date)
            .bind(order.total_amount as i64)
            .bind(&order.shipping.country)
            .bind(&order.shipping.city)
            .bind(&order.shipping.postal_code)
            .execute(&mut *tx)
            .await
            .map_err(|e| backend("insert", e))?;

            for item in &order.items {
                sqlx::query(
                    r#"
                    INSERT INTO order_items (
                        order_item_id, order_id, product_id, quantity, price_at_purchase
                    )
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(item.order_item_id.0.as_uuid())
                .bind(item.order_id.0.as_uuid())
                .bind(item.product_id.0.as_uuid())
                .bind(item.quantity as i32)
                .bind(item.price_at_purchase as i64)
                .execute(&mut *tx)
                .await
                .map_err(|e| backend("insert", e))?;
            }

            tx.commit().await.map_err(|e| backend("insert", e))
        })
    }

    fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order, StoreError> {
        let handle = runtime()?;
        let pool = self.pool.clone();

        handle.block_on(async move {
            let affected = sqlx::query("UPDATE orders SET status = $2 WHERE order_id = $1")
                .bind(id.0.as_uuid())
                .bind(status.as_str())
                .execute(&*pool)
                .await
                .map_err(|e| backend("update_status", e))?
                .rows_affected();

            if affected == 0 {
                return Err(StoreError::Missing(format!("order {id}")));
            }

            let row = sqlx::query(&format!("{SELECT_ORDER} WHERE order_id = $1"))
                .bind(id.0.as_uuid())
                .fetch_one(&*pool)
                .await
                .map_err(|e| backend("update_status", e))?;

            Self::order_from_row(&pool, row).await
        })
    }

    #[instrument(skip(self, predicate), fields(fragments = predicate.fragments().len()))]
    fn find(&self, predicate: &OrderPredicate, page: Page) -> Result<Vec<Order>, StoreError> {
        let handle = runtime()?;
        let pool = self.pool.clone();
        let predicate = predicate.clone();

        handle.block_on(async move {
            let mut builder = QueryBuilder::<Postgres>::new(format!("{SELECT_ORDER} WHERE 1 = 1"));
            Self::push_fragments(&mut builder, &predicate);
            builder.push(" ORDER BY order_date DESC LIMIT ");
            builder.push_bind(page.limit as i64);
            builder.push(" OFFSET ");
            builder.push_bind(page.offset as i64);

            let rows = builder
                .build()
                .fetch_all(&*pool)
                .await
                .map_err(|e| backend("find", e))?;

            let mut orders = Vec::with_capacity(rows.len());
            for row in rows {
                orders.push(Self::order_from_row(&pool, row).await?);
            }
            Ok(orders)
        })
    }

    fn list(&self, page: Page) -> Result<Vec<Order>, StoreError> {
        let handle = runtime()?;
        let pool = self.pool.clone();

        handle.block_on(async move {
            let rows = sqlx::query(&format!(
                "{SELECT_ORDER} ORDER BY order_date DESC LIMIT $1 OFFSET $2"
            ))
            .bind(page.limit as i64)
            .bind(page.offset as i64)
            .fetch_all(&*pool)
            .await
            .map_err(|e| backend("list", e))?;

            let mut orders = Vec::with_capacity(rows.len());
            for row in rows {
                orders.push(Self::order_from_row(&pool, row).await?);
            }
            Ok(orders)
        })
    }
}

/// Postgres-backed status catalog.
#[derive(Debug, Clone)]
pub struct PostgresStatusStore {
    pool: Arc<PgPool>,
}

impl PostgresStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

impl OrderStatusStore for PostgresStatusStore {
    fn find_by_name(&self, name: OrderStatus) -> Result<Option<OrderStatusRecord>, StoreError> {
        let handle = runtime()?;
        let pool = self.pool.clone();

        handle.block_on(async move {
            let row = sqlx::query(
                "SELECT status_id, status_name, description FROM order_statuses WHERE status_name = $1",
            )
            .bind(name.as_str())
            .fetch_optional(&*pool)
            .await
            .map_err(|e| backend("find_by_name", e))?;

            row.map(|row| {
                let status: String = row
                    .try_get("status_name")
                    .map_err(|e| decode("find_by_name", e))?;
                Ok(OrderStatusRecord {
                    status_id: OrderStatusId::new(RecordId::from_uuid(
                        row.try_get("status_id")
                            .map_err(|e| decode("find_by_name", e))?,
                    )),
                    name: status
                        .parse::<OrderStatus>()
                        .map_err(|e| StoreError::Backend(format!("order_statuses: {e}")))?,
                    description: row
                        .try_get("description")
                        .map_err(|e| decode("find_by_name", e))?,
                })
            })
            .transpose()
        })
    }
}

/// Postgres-backed customer directory.
#[derive(Debug, Clone)]
pub struct PostgresCustomerStore {
    pool: Arc<PgPool>,
}

impl PostgresCustomerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

impl CustomerStore for PostgresCustomerStore {
    fn find_by_owner(&self, owner: UserId) -> Result<Option<Customer>, StoreError> {
        let handle = runtime()?;
        let pool = self.pool.clone();

        handle.block_on(async move {
            let row = sqlx::query(
                "SELECT customer_id, owner_id, name, email, created_at FROM customers WHERE owner_id = $1",
            )
            .bind(owner.as_uuid())
            .fetch_optional(&*pool)
            .await
            .map_err(|e| backend("find_by_owner", e))?;

            row.map(|row| {
                Ok(Customer {
                    customer_id: CustomerId::new(RecordId::from_uuid(
                        row.try_get("customer_id")
                            .map_err(|e| decode("find_by_owner", e))?,
                    )),
                    owner: UserId::from_uuid(
                        row.try_get("owner_id")
                            .map_err(|e| decode("find_by_owner", e))?,
                    ),
                    name: row.try_get("name").map_err(|e| decode("find_by_owner", e))?,
                    email: row
                        .try_get("email")
                        .map_err(|e| decode("find_by_owner", e))?,
                    created_at: row
                        .try_get("created_at")
                        .map_err(|e| decode("find_by_owner", e))?,
                })
            })
            .transpose()
        })
    }
}
