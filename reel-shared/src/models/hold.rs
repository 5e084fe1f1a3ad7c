use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use super::ids::{HoldId, SeatId, ShowtimeId};
use super::seat::Seat;

/// Body of `POST /holds`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HoldRequest {
    pub showtime_id: ShowtimeId,
    pub seat_ids: Vec<SeatId>,
}

/// What the server grants for a successful hold request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HoldGrant {
    pub hold_id: HoldId,
    pub expires_at: DateTime<Utc>,
}

/// Client-side, read-only projection of a server-owned hold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Hold {
    pub hold_id: HoldId,
    pub showtime_id: ShowtimeId,
    pub seat_ids: Vec<SeatId>,
    pub expires_at: DateTime<Utc>,
}

impl Hold {
    pub fn from_grant(request: HoldRequest, grant: HoldGrant) -> Self {
        Self {
            hold_id: grant.hold_id,
            showtime_id: request.showtime_id,
            seat_ids: request.seat_ids,
            expires_at: grant.expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShowtimeInfo {
    pub id: ShowtimeId,
    pub movie_title: String,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub auditorium: Option<String>,
}

/// `GET /holds/{id}`: the hold plus what checkout review needs to show
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HoldSummary {
    pub hold: Hold,
    pub seats: Vec<Seat>,
    pub showtime: ShowtimeInfo,
}

impl HoldSummary {
    /// Sum of known seat prices
    pub fn seat_total(&self) -> i64 {
        self.seats.iter().filter_map(|s| s.price).sum()
    }
}
