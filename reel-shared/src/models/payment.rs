use serde::{Deserialize, Serialize};
use super::ids::{BookingId, PaymentId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    EWallet,
    BankTransfer,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub booking_id: BookingId,
    pub method: PaymentMethod,
    pub amount: i64,
}

/// Result of `POST /payments/initiate`. A `payment_url` means the shopper
/// has to finish on the gateway's page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub payment_id: PaymentId,
    #[serde(default)]
    pub payment_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusReport {
    pub status: PaymentStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

impl PaymentStatusReport {
    pub fn pending() -> Self {
        Self { status: PaymentStatus::Pending, reason: None }
    }

    pub fn success() -> Self {
        Self { status: PaymentStatus::Success, reason: None }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self { status: PaymentStatus::Failed, reason: Some(reason.into()) }
    }
}
