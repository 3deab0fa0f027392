//! Store adapters for the order core's persistence ports.

pub mod in_memory;
pub mod postgres;

pub use in_memory::{
    InMemoryCustomerStore, InMemoryOrderStore, InMemoryProductStore, InMemoryStatusStore,
};
pub use postgres::{
    PostgresCustomerStore, PostgresOrderStore, PostgresProductStore, PostgresStatusStore,
};
