//! `storefront-customers` — customer records linked to authenticated users.
//!
//! Customer CRUD is owned elsewhere; this crate only carries the record shape
//! the order core resolves callers against.

pub mod customer;

pub use customer::{Customer, CustomerId};
