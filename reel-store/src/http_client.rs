use async_trait::async_trait;
use reel_core::{ApiError, ApiResult, CinemaApi};
use reel_shared::{
    ApiErrorBody, ApplyGiftCardRequest, ApplyPointsRequest, ApplyPromoRequest, Booking, BookingId,
    CreateBookingRequest, Envelope, HoldGrant, HoldId, HoldRequest, HoldSummary,
    InitiatePaymentRequest, PaymentId, PaymentSession, PaymentStatusReport, Seat, ShowtimeId,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::app_config::ApiConfig;

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// reqwest-backed `CinemaApi`. Unwraps the `{data, meta, timestamp}`
/// envelope and maps `{status, code, message, details}` error bodies.
#[derive(Clone)]
pub struct HttpCinemaApi {
    client: Client,
    base_url: String,
}

impl HttpCinemaApi {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self::with_client(client, &config.base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self { client, base_url: base_url.trim_end_matches('/').to_string() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = dispatch(request).await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let envelope = response
            .json::<Envelope<T>>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(envelope.into_data())
    }
}

async fn dispatch(request: RequestBuilder) -> ApiResult<Response> {
    request.send().await.map_err(|e| ApiError::Transport(e.to_string()))
}

/// Turns a non-2xx response into `ApiError::Status`, falling back to the
/// raw body when it is not a JSON error body
async fn error_from_response(response: Response) -> ApiError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiErrorBody>(&text) {
        Ok(body) => ApiError::Status { status: status.as_u16(), code: body.code, message: body.message },
        Err(_) => ApiError::Status {
            status: status.as_u16(),
            code: None,
            message: if text.is_empty() {
                status.canonical_reason().unwrap_or("Request failed").to_string()
            } else {
                text
            },
        },
    }
}

/// A 409 with `details.seatIds` becomes `SeatsUnavailable`. A 409 that
/// names no seats stays a plain status error.
async fn hold_error_from_response(response: Response) -> ApiError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ApiErrorBody>(&text).ok();

    if status == StatusCode::CONFLICT {
        if let Some(body) = &body {
            if let Some(details) = body.conflict_details().filter(|d| !d.seat_ids.is_empty()) {
                warn!(seats = ?details.seat_ids, "Hold rejected, seats taken");
                return ApiError::SeatsUnavailable { seat_ids: details.seat_ids, message: body.message.clone() };
            }
        }
    }

    match body {
        Some(body) => ApiError::Status { status: status.as_u16(), code: body.code, message: body.message },
        None => ApiError::Status { status: status.as_u16(), code: None, message: text },
    }
}

#[async_trait]
impl CinemaApi for HttpCinemaApi {
    async fn seats(&self, showtime_id: &ShowtimeId) -> ApiResult<Vec<Seat>> {
        self.send(self.client.get(self.url(&format!("/showtimes/{}/seats", showtime_id)))).await
    }

    async fn create_hold(&self, request: &HoldRequest) -> ApiResult<HoldGrant> {
        let response = dispatch(self.client.post(self.url("/holds")).json(request)).await?;
        if !response.status().is_success() {
            return Err(hold_error_from_response(response).await);
        }
        response
            .json::<Envelope<HoldGrant>>()
            .await
            .map(Envelope::into_data)
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn release_hold(&self, hold_id: &HoldId) -> ApiResult<()> {
        let response = dispatch(self.client.delete(self.url(&format!("/holds/{}", hold_id)))).await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            // Already expired or consumed by a booking
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                debug!(%hold_id, "Hold already gone on release");
                Ok(())
            }
            _ => Err(error_from_response(response).await),
        }
    }

    async fn hold_summary(&self, hold_id: &HoldId) -> ApiResult<HoldSummary> {
        self.send(self.client.get(self.url(&format!("/holds/{}", hold_id)))).await
    }

    async fn create_booking(&self, request: &CreateBookingRequest, idempotency_key: &str) -> ApiResult<Booking> {
        self.send(
            self.client
                .post(self.url("/bookings"))
                .header(IDEMPOTENCY_HEADER, idempotency_key)
                .json(request),
        )
        .await
    }

    async fn apply_promo(&self, booking_id: &BookingId, code: &str) -> ApiResult<Booking> {
        let body = ApplyPromoRequest { code: code.to_string() };
        self.send(self.client.post(self.url(&format!("/bookings/{}/apply-promo", booking_id))).json(&body))
            .await
    }

    async fn apply_points(&self, booking_id: &BookingId, points: u32) -> ApiResult<Booking> {
        let body = ApplyPointsRequest { points };
        self.send(self.client.post(self.url(&format!("/bookings/{}/apply-points", booking_id))).json(&body))
            .await
    }

    async fn apply_gift_card(&self, booking_id: &BookingId, code: &str) -> ApiResult<Booking> {
        let body = ApplyGiftCardRequest { code: code.to_string() };
        self.send(self.client.post(self.url(&format!("/bookings/{}/apply-gift-card", booking_id))).json(&body))
            .await
    }

    async fn confirm_booking(&self, booking_id: &BookingId) -> ApiResult<Booking> {
        self.send(self.client.post(self.url(&format!("/bookings/{}/confirm", booking_id)))).await
    }

    async fn initiate_payment(&self, request: &InitiatePaymentRequest) -> ApiResult<PaymentSession> {
        self.send(self.client.post(self.url("/payments/initiate")).json(request)).await
    }

    async fn payment_status(&self, payment_id: &PaymentId) -> ApiResult<PaymentStatusReport> {
        self.send(self.client.get(self.url(&format!("/payments/{}/status", payment_id)))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalised() {
        let api = HttpCinemaApi::with_client(Client::new(), "http://localhost:8080/api/");
        assert_eq!(api.url("/holds"), "http://localhost:8080/api/holds");
    }

    #[test]
    fn test_new_uses_configured_base() {
        let api = HttpCinemaApi::new(&ApiConfig { base_url: "https://x.test".to_string(), timeout_ms: 500 }).unwrap();
        assert_eq!(api.url("/showtimes/st-1/seats"), "https://x.test/showtimes/st-1/seats");
    }
}
