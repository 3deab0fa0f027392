use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_catalog::ProductId;
use storefront_core::{DomainError, DomainResult, Entity, RecordId, ValueObject};
use storefront_customers::CustomerId;

use crate::status::OrderStatus;

/// Order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub RecordId);

impl OrderId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Order item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderItemId(pub RecordId);

impl OrderItemId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Where an order ships to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub country: String,
    pub city: String,
    pub postal_code: String,
}

impl ValueObject for ShippingAddress {}

/// Order line: product, quantity, and the unit price captured at purchase
/// time. Owned exclusively by its order; created once, never mutated after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub order_item_id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price snapshot in smallest currency unit; protects the customer
    /// from later catalog price changes.
    pub price_at_purchase: u64,
}

impl OrderItem {
    pub fn subtotal(&self) -> u64 {
        self.price_at_purchase * u64::from(self.quantity)
    }
}

/// Order record with its owned line items.
///
/// `total_amount` is derived at placement time from the item snapshots and is
/// immutable thereafter; it is never recomputed from the live catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub total_amount: u64,
    pub shipping: ShippingAddress,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Assemble a new `pending` order from validated line items.
    ///
    /// Enforces the placement invariants: at least one item, positive
    /// quantities and prices, every item referencing this order, and
    /// `total_amount == Σ item.price_at_purchase × item.quantity`.
    pub fn place(
        order_id: OrderId,
        customer_id: CustomerId,
        shipping: ShippingAddress,
        items: Vec<OrderItem>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::validation(
                "order must contain at least one item",
            ));
        }

        for item in &items {
            if item.order_id != order_id {
                return Err(DomainError::invariant("item does not belong to this order"));
            }
            if item.quantity == 0 {
                return Err(DomainError::validation("quantity must be positive"));
            }
            if item.price_at_purchase == 0 {
                return Err(DomainError::validation(
                    "price_at_purchase must be positive",
                ));
            }
        }

        let total_amount = items.iter().map(OrderItem::subtotal).sum();

        Ok(Self {
            order_id,
            customer_id,
            status: OrderStatus::Pending,
            order_date: now,
            total_amount,
            shipping,
            items,
        })
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.order_id
    }
}
