//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values; two
/// instances with the same values are the same value. `ShippingAddress` and
/// `StockLevel` are value objects; `Order` is an entity.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
