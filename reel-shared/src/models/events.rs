use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use super::ids::{SeatId, ShowtimeId};

/// Pushed on the realtime channel when seats the shopper is looking at
/// were secured by someone else
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeatConflictEvent {
    pub showtime_id: ShowtimeId,
    pub seat_ids: Vec<SeatId>,
    pub occurred_at: DateTime<Utc>,
}
