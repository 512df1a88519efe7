//! Persistence layer for the commerce core.
//!
//! The workflows talk to storage only through the ports in [`store`]:
//! stock reservation and order writes compose inside a [`Transaction`],
//! while payment status changes are single conditional writes.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::{OrderFilter, PaymentFilter};
pub use store::{
    CommerceStore, OrderRepository, PaymentRepository, ProductCatalog, StockLedger, Transaction,
    TransactionalStore,
};
