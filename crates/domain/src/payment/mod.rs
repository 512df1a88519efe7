//! Payments against orders.

mod status;

pub use status::{PaymentMethod, PaymentStatus};

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId, UserId};
use serde::{Deserialize, Serialize};

/// Gateway transaction identifier. Unique across all payments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TransactionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for TransactionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Terminal result of a settlement attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentOutcome {
    Success,
    Failed { reason: String },
}

impl PaymentOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        PaymentOutcome::Failed {
            reason: reason.into(),
        }
    }

    /// The status this outcome resolves a payment to.
    pub fn status(&self) -> PaymentStatus {
        match self {
            PaymentOutcome::Success => PaymentStatus::Success,
            PaymentOutcome::Failed { .. } => PaymentStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PaymentOutcome::Success)
    }
}

/// A payment for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    /// Copied from the order total when the payment is created.
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: TransactionId,
    pub paid_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    /// Set when a settlement task claims the payment.
    pub processing_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a PENDING payment.
    pub fn new(
        order_id: OrderId,
        user_id: UserId,
        amount: Money,
        method: PaymentMethod,
        transaction_id: TransactionId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            order_id,
            user_id,
            amount,
            method,
            status: PaymentStatus::Pending,
            transaction_id,
            paid_at: None,
            failure_reason: None,
            processing_started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// PENDING -> PROCESSING. Returns false and leaves the payment untouched otherwise.
    pub fn mark_processing(&mut self, at: DateTime<Utc>) -> bool {
        if self.status != PaymentStatus::Pending {
            return false;
        }
        self.status = PaymentStatus::Processing;
        self.processing_started_at = Some(at);
        self.updated_at = at;
        true
    }

    /// Applies a terminal outcome. Returns false and leaves the payment
    /// untouched if it is already terminal.
    pub fn resolve(&mut self, outcome: &PaymentOutcome, at: DateTime<Utc>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = outcome.status();
        match outcome {
            PaymentOutcome::Success => self.paid_at = Some(at),
            PaymentOutcome::Failed { reason } => self.failure_reason = Some(reason.clone()),
        }
        self.updated_at = at;
        true
    }

    /// Time the current settlement attempt began, falling back to creation.
    pub fn settlement_started_at(&self) -> DateTime<Utc> {
        self.processing_started_at.unwrap_or(self.created_at)
    }
}
