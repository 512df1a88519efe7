//! Domain model for the commerce core.
//!
//! This crate holds the entities shared by the order and payment workflows:
//! - `Product` as referenced from the catalog
//! - `Order` / `OrderItem` with the `OrderStatus` state machine
//! - `Payment` with `PaymentStatus` and `PaymentMethod`
//!
//! Everything here is pure data and rules; persistence lives in `store`.

pub mod error;
pub mod order;
pub mod payment;
pub mod product;

pub use error::DomainError;
pub use order::{NewOrderItem, Order, OrderItem, OrderStatus};
pub use payment::{Payment, PaymentMethod, PaymentOutcome, PaymentStatus, TransactionId};
pub use product::Product;
