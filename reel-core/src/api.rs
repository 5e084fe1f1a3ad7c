use async_trait::async_trait;
use futures_util::stream::BoxStream;
use reel_shared::{
    Booking, BookingId, CreateBookingRequest, HoldGrant, HoldId, HoldRequest, HoldSummary,
    InitiatePaymentRequest, PaymentId, PaymentSession, PaymentStatusReport, Seat,
    SeatConflictEvent, ShowtimeId,
};
use crate::error::ApiError;

pub type ApiResult<T> = Result<T, ApiError>;

/// The remote cinema API. The server is the sole arbiter of seats, holds,
/// bookings and payments; implementors only transport requests.
#[async_trait]
pub trait CinemaApi: Send + Sync {
    /// `GET /showtimes/{id}/seats`
    async fn seats(&self, showtime_id: &ShowtimeId) -> ApiResult<Vec<Seat>>;

    /// `POST /holds`. A 409 maps to `ApiError::SeatsUnavailable`.
    async fn create_hold(&self, request: &HoldRequest) -> ApiResult<HoldGrant>;

    /// `DELETE /holds/{id}`. Releasing an unknown or expired hold succeeds.
    async fn release_hold(&self, hold_id: &HoldId) -> ApiResult<()>;

    /// `GET /holds/{id}`
    async fn hold_summary(&self, hold_id: &HoldId) -> ApiResult<HoldSummary>;

    /// `POST /bookings`; the same key always yields the same booking
    async fn create_booking(
        &self,
        request: &CreateBookingRequest,
        idempotency_key: &str,
    ) -> ApiResult<Booking>;

    async fn apply_promo(&self, booking_id: &BookingId, code: &str) -> ApiResult<Booking>;

    async fn apply_points(&self, booking_id: &BookingId, points: u32) -> ApiResult<Booking>;

    async fn apply_gift_card(&self, booking_id: &BookingId, code: &str) -> ApiResult<Booking>;

    async fn confirm_booking(&self, booking_id: &BookingId) -> ApiResult<Booking>;

    async fn initiate_payment(&self, request: &InitiatePaymentRequest) -> ApiResult<PaymentSession>;

    async fn payment_status(&self, payment_id: &PaymentId) -> ApiResult<PaymentStatusReport>;
}

pub type ConflictStream = BoxStream<'static, SeatConflictEvent>;

/// Best-effort push channel of seat conflicts for one showtime
#[async_trait]
pub trait ConflictFeed: Send + Sync {
    async fn subscribe(&self, showtime_id: &ShowtimeId) -> ApiResult<ConflictStream>;
}
