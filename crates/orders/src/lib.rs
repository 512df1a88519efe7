//! Order workflow for the commerce core.
//!
//! [`OrderService`] owns the order lifecycle: checkout reserves stock for
//! every item and creates the order in one transaction, cancellation
//! restores stock and cancels in one transaction, and every other status
//! change is a compare-and-set on the current status.
//!
//! Payment settlement reaches back into this crate only through the
//! [`OrderPayments`] capability.

pub mod error;
pub mod payments;
pub mod service;

pub use error::{OrderError, Result};
pub use payments::OrderPayments;
pub use service::OrderService;
