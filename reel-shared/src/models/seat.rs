use serde::{Deserialize, Serialize};
use super::ids::SeatId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatType {
    Standard,
    Vip,
    Couple,
    Disabled,
}

/// Seat status as reported by the server. `Held` is transient: another
/// shopper (or this one) has an unexpired hold on it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Available,
    Booked,
    Blocked,
    Held,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub id: SeatId,
    pub row: String,
    pub number: u32,
    #[serde(rename = "type")]
    pub seat_type: SeatType,
    pub status: SeatStatus,
    #[serde(default)]
    pub price: Option<i64>,
}

impl Seat {
    pub fn new(id: impl Into<SeatId>, row: &str, number: u32) -> Self {
        Self {
            id: id.into(),
            row: row.to_string(),
            number,
            seat_type: SeatType::Standard,
            status: SeatStatus::Available,
            price: None,
        }
    }

    pub fn with_status(mut self, status: SeatStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_price(mut self, price: i64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn is_selectable(&self) -> bool {
        self.status == SeatStatus::Available
    }

    /// Row letter plus number, e.g. "B12"
    pub fn label(&self) -> String {
        format!("{}{}", self.row, self.number)
    }
}
