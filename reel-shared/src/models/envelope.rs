use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use super::ids::SeatId;

/// Wrapper every successful API response arrives in
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl<T> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self { data, meta: None, timestamp: Utc::now() }
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

/// Body of every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiErrorBody {
    pub status: u16,
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiErrorBody {
    /// Seats named in a 409 hold rejection, if the details carry them
    pub fn conflict_details(&self) -> Option<ConflictDetails> {
        let details = self.details.clone()?;
        serde_json::from_value(details).ok()
    }
}

/// `details` of a 409 on `POST /holds`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDetails {
    pub seat_ids: Vec<SeatId>,
}
