//! Payment settlement for the commerce core.
//!
//! A payment is created PENDING against a PENDING order and handed to a
//! background settlement task. Either that task or a gateway callback
//! resolves it to SUCCESS or FAILED; the store makes the terminal write
//! exactly-once, and the loser observes `PaymentAlreadyProcessed`.
//!
//! On SUCCESS the order is moved to PAID through the
//! [`orders::OrderPayments`] capability. The two writes commit separately;
//! [`PaymentService::reconcile_paid_orders`] repairs orders left behind.

pub mod error;
pub mod gateway;
pub mod service;
pub mod transaction;

pub use error::{PaymentError, Result};
pub use gateway::{InMemoryGateway, PaymentGateway, SimulatedGateway};
pub use service::PaymentService;
pub use transaction::generate_transaction_id;
