//! Payment status and method vocabularies.

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// The status of a payment.
///
/// State transitions:
/// ```text
/// PENDING ──► PROCESSING ──┬──► SUCCESS
///    │                     └──► FAILED
///    └──────────────────────────► SUCCESS / FAILED   (callback before the task starts)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Success,
    Failed,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 4] = [
        PaymentStatus::Pending,
        PaymentStatus::Processing,
        PaymentStatus::Success,
        PaymentStatus::Failed,
    ];

    /// SUCCESS and FAILED are final; nothing may overwrite them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Failed)
    }

    /// Every status except FAILED occupies the order's single payment slot.
    pub fn blocks_new_payment(&self) -> bool {
        !matches!(self, PaymentStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::UnknownVariant {
                kind: "payment status",
                value: s.to_string(),
            })
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    BankTransfer,
    CreditCard,
    EWallet,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [
        PaymentMethod::BankTransfer,
        PaymentMethod::CreditCard,
        PaymentMethod::EWallet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::EWallet => "E_WALLET",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| DomainError::UnknownVariant {
                kind: "payment method",
                value: s.to_string(),
            })
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
