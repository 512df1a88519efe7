//! Shared types used across the commerce workspace.

pub mod actor;
pub mod money;
pub mod page;
pub mod types;

pub use actor::{Actor, Role};
pub use money::Money;
pub use page::{Page, PageRequest};
pub use types::{OrderId, PaymentId, ProductId, UserId};
