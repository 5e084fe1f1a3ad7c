//! In-memory stand-ins for the remote API and the realtime feed.

use async_trait::async_trait;
use chrono::Duration;
use futures_util::StreamExt;
use reel_shared::{
    Booking, BookingId, BookingStatus, CreateBookingRequest, Hold, HoldGrant, HoldId, HoldRequest,
    HoldSummary, InitiatePaymentRequest, PaymentId, PaymentSession, PaymentStatusReport, Seat,
    SeatConflictEvent, SeatId, SeatStatus, ShowtimeId, ShowtimeInfo,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::api::{ApiResult, CinemaApi, ConflictFeed, ConflictStream};
use crate::clock::Clock;
use crate::error::ApiError;

pub const MOCK_SNACK_PRICE: i64 = 45_000;

/// Every call the mock received, in order
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Seats(ShowtimeId),
    CreateHold(HoldRequest),
    ReleaseHold(HoldId),
    HoldSummary(HoldId),
    CreateBooking { request: CreateBookingRequest, idempotency_key: String },
    ApplyPromo(BookingId, String),
    ApplyPoints(BookingId, u32),
    ApplyGiftCard(BookingId, String),
    ConfirmBooking(BookingId),
    InitiatePayment(InitiatePaymentRequest),
    PaymentStatus(PaymentId),
}

#[derive(Debug, Default, Clone, Copy)]
struct Discounts {
    promo: i64,
    points: i64,
    gift_card: i64,
}

#[derive(Default)]
struct MockState {
    seats: HashMap<ShowtimeId, Vec<Seat>>,
    seat_failures: VecDeque<ApiError>,
    hold_results: VecDeque<ApiResult<HoldGrant>>,
    holds: HashMap<HoldId, Hold>,
    bookings: HashMap<BookingId, Booking>,
    discounts: HashMap<BookingId, Discounts>,
    bookings_by_key: HashMap<String, BookingId>,
    promos: HashMap<String, i64>,
    gift_cards: HashMap<String, i64>,
    payment_url: Option<String>,
    payment_statuses: VecDeque<ApiResult<PaymentStatusReport>>,
    initiate_errors: VecDeque<ApiError>,
    confirm_errors: VecDeque<ApiError>,
    release_error: Option<ApiError>,
    calls: Vec<ApiCall>,
    next_id: u32,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn set_seat_status(&mut self, showtime_id: &ShowtimeId, seat_ids: &[SeatId], status: SeatStatus) {
        if let Some(seats) = self.seats.get_mut(showtime_id) {
            for seat in seats.iter_mut().filter(|s| seat_ids.contains(&s.id)) {
                seat.status = status;
            }
        }
    }

    fn booking_mut(&mut self, booking_id: &BookingId) -> ApiResult<&mut Booking> {
        self.bookings
            .get_mut(booking_id)
            .ok_or_else(|| ApiError::status(404, format!("Booking {} not found", booking_id)))
    }

    fn reprice(&mut self, booking_id: &BookingId) -> ApiResult<Booking> {
        let discounts = self.discounts.get(booking_id).copied().unwrap_or_default();
        let booking = self.booking_mut(booking_id)?;
        booking.discount = discounts.promo + discounts.points + discounts.gift_card;
        booking.total = (booking.subtotal - booking.discount).max(0);
        Ok(booking.clone())
    }
}

/// Scriptable in-memory `CinemaApi`. Unscripted calls behave like a well
/// behaved server: holds lock seats, releases are idempotent, bookings are
/// deduplicated by idempotency key and payments stay pending.
pub struct MockCinemaApi {
    clock: Arc<dyn Clock>,
    hold_ttl: Duration,
    state: Mutex<MockState>,
}

impl MockCinemaApi {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            hold_ttl: Duration::minutes(10),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_hold_ttl(mut self, ttl: Duration) -> Self {
        self.hold_ttl = ttl;
        self
    }

    pub fn with_seats(self, showtime_id: impl Into<ShowtimeId>, seats: Vec<Seat>) -> Self {
        self.state().seats.insert(showtime_id.into(), seats);
        self
    }

    pub fn with_promo(self, code: &str, discount: i64) -> Self {
        self.state().promos.insert(code.to_string(), discount);
        self
    }

    pub fn with_gift_card(self, code: &str, balance: i64) -> Self {
        self.state().gift_cards.insert(code.to_string(), balance);
        self
    }

    pub fn with_payment_url(self, url: &str) -> Self {
        self.state().payment_url = Some(url.to_string());
        self
    }

    pub fn push_hold_result(&self, result: ApiResult<HoldGrant>) {
        self.state().hold_results.push_back(result);
    }

    pub fn push_seats_failure(&self, error: ApiError) {
        self.state().seat_failures.push_back(error);
    }

    pub fn push_payment_status(&self, report: PaymentStatusReport) {
        self.state().payment_statuses.push_back(Ok(report));
    }

    pub fn push_payment_error(&self, error: ApiError) {
        self.state().payment_statuses.push_back(Err(error));
    }

    /// Fail the next `initiate_payment` call
    pub fn push_initiate_error(&self, error: ApiError) {
        self.state().initiate_errors.push_back(error);
    }

    /// Fail the next `confirm_booking` call
    pub fn push_confirm_error(&self, error: ApiError) {
        self.state().confirm_errors.push_back(error);
    }

    pub fn fail_releases(&self, error: ApiError) {
        self.state().release_error = Some(error);
    }

    /// Another shopper takes these seats
    pub fn mark_taken(&self, showtime_id: &ShowtimeId, seat_ids: &[SeatId]) {
        self.state().set_seat_status(showtime_id, seat_ids, SeatStatus::Booked);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn active_hold(&self, hold_id: &HoldId) -> Option<Hold> {
        self.state().holds.get(hold_id).cloned()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: ApiCall) -> MutexGuard<'_, MockState> {
        let mut state = self.state();
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl CinemaApi for MockCinemaApi {
    async fn seats(&self, showtime_id: &ShowtimeId) -> ApiResult<Vec<Seat>> {
        let mut state = self.record(ApiCall::Seats(showtime_id.clone()));
        if let Some(error) = state.seat_failures.pop_front() {
            return Err(error);
        }
        state
            .seats
            .get(showtime_id)
            .cloned()
            .ok_or_else(|| ApiError::status(404, format!("Showtime {} not found", showtime_id)))
    }

    async fn create_hold(&self, request: &HoldRequest) -> ApiResult<HoldGrant> {
        let mut state = self.record(ApiCall::CreateHold(request.clone()));

        let grant = match state.hold_results.pop_front() {
            Some(scripted) => scripted?,
            None => {
                let seats = state.seats.get(&request.showtime_id).cloned().unwrap_or_default();
                let taken: Vec<SeatId> = request
                    .seat_ids
                    .iter()
                    .filter(|id| !seats.iter().any(|s| &s.id == *id && s.is_selectable()))
                    .cloned()
                    .collect();
                if !taken.is_empty() {
                    return Err(ApiError::SeatsUnavailable {
                        seat_ids: taken,
                        message: "Some seats are no longer available".to_string(),
                    });
                }
                HoldGrant {
                    hold_id: HoldId::new(state.next_id("h")),
                    expires_at: self.clock.now() + self.hold_ttl,
                }
            }
        };

        state.set_seat_status(&request.showtime_id, &request.seat_ids, SeatStatus::Held);
        let hold = Hold::from_grant(request.clone(), grant.clone());
        state.holds.insert(hold.hold_id.clone(), hold);
        Ok(grant)
    }

    async fn release_hold(&self, hold_id: &HoldId) -> ApiResult<()> {
        let mut state = self.record(ApiCall::ReleaseHold(hold_id.clone()));
        if let Some(error) = state.release_error.clone() {
            return Err(error);
        }
        if let Some(hold) = state.holds.remove(hold_id) {
            state.set_seat_status(&hold.showtime_id, &hold.seat_ids, SeatStatus::Available);
        }
        Ok(())
    }

    async fn hold_summary(&self, hold_id: &HoldId) -> ApiResult<HoldSummary> {
        let state = self.record(ApiCall::HoldSummary(hold_id.clone()));
        let hold = state
            .holds
            .get(hold_id)
            .cloned()
            .ok_or_else(|| ApiError::status(404, "Hold expired or not found"))?;
        let seats = state
            .seats
            .get(&hold.showtime_id)
            .map(|all| all.iter().filter(|s| hold.seat_ids.contains(&s.id)).cloned().collect())
            .unwrap_or_default();
        let showtime = ShowtimeInfo {
            id: hold.showtime_id.clone(),
            movie_title: "Feature Presentation".to_string(),
            starts_at: self.clock.now() + Duration::hours(2),
            auditorium: Some("Hall 1".to_string()),
        };
        Ok(HoldSummary { hold, seats, showtime })
    }

    async fn create_booking(&self, request: &CreateBookingRequest, idempotency_key: &str) -> ApiResult<Booking> {
        let mut state = self.record(ApiCall::CreateBooking {
            request: request.clone(),
            idempotency_key: idempotency_key.to_string(),
        });

        if let Some(existing) = state.bookings_by_key.get(idempotency_key).cloned() {
            return state.booking_mut(&existing).map(|b| b.clone());
        }

        let hold = state
            .holds
            .get(&request.hold_id)
            .cloned()
            .ok_or_else(|| ApiError::status(404, "Hold expired or not found"))?;
        let seat_total: i64 = state
            .seats
            .get(&hold.showtime_id)
            .map(|all| {
                all.iter()
                    .filter(|s| hold.seat_ids.contains(&s.id))
                    .filter_map(|s| s.price)
                    .sum()
            })
            .unwrap_or(0);
        let snack_total: i64 = request.snacks.iter().map(|s| i64::from(s.quantity) * MOCK_SNACK_PRICE).sum();

        let booking = Booking {
            id: BookingId::new(state.next_id("b")),
            hold_id: request.hold_id.clone(),
            status: BookingStatus::Pending,
            snacks: request.snacks.clone(),
            subtotal: seat_total + snack_total,
            discount: 0,
            total: seat_total + snack_total,
            promo_code: None,
            points_applied: None,
            gift_card_code: None,
        };
        state.bookings_by_key.insert(idempotency_key.to_string(), booking.id.clone());
        state.bookings.insert(booking.id.clone(), booking.clone());
        Ok(booking)
    }

    async fn apply_promo(&self, booking_id: &BookingId, code: &str) -> ApiResult<Booking> {
        let mut state = self.record(ApiCall::ApplyPromo(booking_id.clone(), code.to_string()));
        let discount = *state.promos.get(code).ok_or_else(|| ApiError::Status {
            status: 400,
            code: Some("INVALID_PROMO".to_string()),
            message: format!("Promo code {} is not valid", code),
        })?;
        state.booking_mut(booking_id)?.promo_code = Some(code.to_string());
        state.discounts.entry(booking_id.clone()).or_default().promo = discount;
        state.reprice(booking_id)
    }

    async fn apply_points(&self, booking_id: &BookingId, points: u32) -> ApiResult<Booking> {
        let mut state = self.record(ApiCall::ApplyPoints(booking_id.clone(), points));
        state.booking_mut(booking_id)?.points_applied = Some(points);
        state.discounts.entry(booking_id.clone()).or_default().points = i64::from(points);
        state.reprice(booking_id)
    }

    async fn apply_gift_card(&self, booking_id: &BookingId, code: &str) -> ApiResult<Booking> {
        let mut state = self.record(ApiCall::ApplyGiftCard(booking_id.clone(), code.to_string()));
        let balance = *state.gift_cards.get(code).ok_or_else(|| ApiError::Status {
            status: 400,
            code: Some("INVALID_GIFT_CARD".to_string()),
            message: format!("Gift card {} is not valid", code),
        })?;
        state.booking_mut(booking_id)?.gift_card_code = Some(code.to_string());
        state.discounts.entry(booking_id.clone()).or_default().gift_card = balance;
        state.reprice(booking_id)
    }

    async fn confirm_booking(&self, booking_id: &BookingId) -> ApiResult<Booking> {
        let mut state = self.record(ApiCall::ConfirmBooking(booking_id.clone()));
        if let Some(error) = state.confirm_errors.pop_front() {
            return Err(error);
        }
        let booking = {
            let booking = state.booking_mut(booking_id)?;
            booking.status = BookingStatus::Confirmed;
            booking.clone()
        };
        if let Some(hold) = state.holds.remove(&booking.hold_id) {
            state.set_seat_status(&hold.showtime_id, &hold.seat_ids, SeatStatus::Booked);
        }
        Ok(booking)
    }

    async fn initiate_payment(&self, request: &InitiatePaymentRequest) -> ApiResult<PaymentSession> {
        let mut state = self.record(ApiCall::InitiatePayment(request.clone()));
        if let Some(error) = state.initiate_errors.pop_front() {
            return Err(error);
        }
        state.booking_mut(&request.booking_id)?;
        Ok(PaymentSession {
            payment_id: PaymentId::new(state.next_id("p")),
            payment_url: state.payment_url.clone(),
        })
    }

    async fn payment_status(&self, payment_id: &PaymentId) -> ApiResult<PaymentStatusReport> {
        let mut state = self.record(ApiCall::PaymentStatus(payment_id.clone()));
        state
            .payment_statuses
            .pop_front()
            .unwrap_or_else(|| Ok(PaymentStatusReport::pending()))
    }
}

/// Broadcast-backed `ConflictFeed`
pub struct MockConflictFeed {
    tx: broadcast::Sender<SeatConflictEvent>,
    refuse: AtomicBool,
    subscriptions: AtomicUsize,
}

impl MockConflictFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx, refuse: AtomicBool::new(false), subscriptions: AtomicUsize::new(0) }
    }

    /// Make every subscribe attempt fail, as if the socket never connects
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Returns how many live subscribers received the event
    pub fn publish(&self, event: SeatConflictEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

impl Default for MockConflictFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConflictFeed for MockConflictFeed {
    async fn subscribe(&self, showtime_id: &ShowtimeId) -> ApiResult<ConflictStream> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("realtime channel unavailable".to_string()));
        }

        let showtime_id = showtime_id.clone();
        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(move |result| {
            let showtime_id = showtime_id.clone();
            async move {
                match result {
                    Ok(event) if event.showtime_id == showtime_id => Some(event),
                    _ => None,
                }
            }
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn api() -> MockCinemaApi {
        MockCinemaApi::new(Arc::new(SystemClock)).with_seats(
            "st-1",
            vec![
                Seat::new("A1", "A", 1).with_price(90_000),
                Seat::new("A2", "A", 2).with_price(90_000),
                Seat::new("A3", "A", 3).with_status(SeatStatus::Booked),
            ],
        )
    }

    fn hold_request(ids: &[&str]) -> HoldRequest {
        HoldRequest {
            showtime_id: "st-1".into(),
            seat_ids: ids.iter().map(|id| SeatId::from(*id)).collect(),
        }
    }

    #[tokio::test]
    async fn test_hold_rejects_taken_seats() {
        let api = api();
        let err = api.create_hold(&hold_request(&["A1", "A3"])).await.unwrap_err();

        assert_eq!(
            err,
            ApiError::SeatsUnavailable {
                seat_ids: vec!["A3".into()],
                message: "Some seats are no longer available".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_hold_then_release_frees_seats() {
        let api = api();
        let grant = api.create_hold(&hold_request(&["A1"])).await.unwrap();

        let seats = api.seats(&"st-1".into()).await.unwrap();
        assert_eq!(seats[0].status, SeatStatus::Held);

        api.release_hold(&grant.hold_id).await.unwrap();
        api.release_hold(&grant.hold_id).await.unwrap();
        let seats = api.seats(&"st-1".into()).await.unwrap();
        assert_eq!(seats[0].status, SeatStatus::Available);
    }

    #[tokio::test]
    async fn test_booking_is_deduplicated_by_key() {
        let api = api().with_promo("SUMMER20", 36_000);
        let grant = api.create_hold(&hold_request(&["A1", "A2"])).await.unwrap();
        let request = CreateBookingRequest { hold_id: grant.hold_id, snacks: vec![] };

        let first = api.create_booking(&request, "key-1").await.unwrap();
        let second = api.create_booking(&request, "key-1").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.total, 180_000);

        let discounted = api.apply_promo(&first.id, "SUMMER20").await.unwrap();
        assert_eq!(discounted.total, 144_000);
        assert!(api.apply_promo(&first.id, "NOPE").await.is_err());
    }

    #[tokio::test]
    async fn test_feed_filters_by_showtime() {
        let feed = MockConflictFeed::new();
        let mut stream = feed.subscribe(&"st-1".into()).await.unwrap();

        let now = chrono::Utc::now();
        feed.publish(SeatConflictEvent { showtime_id: "st-2".into(), seat_ids: vec!["X1".into()], occurred_at: now });
        feed.publish(SeatConflictEvent { showtime_id: "st-1".into(), seat_ids: vec!["A1".into()], occurred_at: now });

        let event = stream.next().await.unwrap();
        assert_eq!(event.seat_ids, vec![SeatId::from("A1")]);
    }
}
