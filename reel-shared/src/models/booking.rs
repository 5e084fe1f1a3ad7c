use serde::{Deserialize, Serialize};
use super::ids::{BookingId, HoldId, SnackId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SnackSelection {
    pub snack_id: SnackId,
    pub quantity: u32,
}

/// Booking record as returned by the server. All money fields are minor
/// units and server-computed; the client only redisplays them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: BookingId,
    pub hold_id: HoldId,
    pub status: BookingStatus,
    #[serde(default)]
    pub snacks: Vec<SnackSelection>,
    pub subtotal: i64,
    #[serde(default)]
    pub discount: i64,
    pub total: i64,
    #[serde(default)]
    pub promo_code: Option<String>,
    #[serde(default)]
    pub points_applied: Option<u32>,
    #[serde(default)]
    pub gift_card_code: Option<String>,
}

impl Booking {
    pub fn is_payable(&self) -> bool {
        self.status == BookingStatus::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub hold_id: HoldId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snacks: Vec<SnackSelection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPromoRequest {
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPointsRequest {
    pub points: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplyGiftCardRequest {
    pub code: String,
}
