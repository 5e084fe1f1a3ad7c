use reel_core::CinemaApi;
use reel_shared::{Booking, BookingId, CreateBookingRequest, HoldId, HoldSummary, PaymentId, PaymentMethod, SnackSelection};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::checkout::{transition, CheckoutError, CheckoutEvent, CheckoutState};
use crate::payment::{PaymentOrchestrator, PaymentOutcome};

/// Checkout for one hold: review, snacks, then payment. The booking is
/// created at most once per hold and reused on every later pass.
pub struct CheckoutPipeline {
    api: Arc<dyn CinemaApi>,
    payments: PaymentOrchestrator,
    hold_id: HoldId,
    idempotency_key: String,
    state: CheckoutState,
    summary: Option<HoldSummary>,
    snacks: Vec<SnackSelection>,
    booking: Option<Booking>,
    /// Initiated but not yet known to have succeeded or failed
    pending_payment: Option<PaymentId>,
}

impl CheckoutPipeline {
    pub fn new(api: Arc<dyn CinemaApi>, payments: PaymentOrchestrator, hold_id: HoldId) -> Self {
        Self {
            api,
            payments,
            hold_id,
            idempotency_key: Uuid::new_v4().to_string(),
            state: CheckoutState::Reviewing,
            summary: None,
            snacks: Vec::new(),
            booking: None,
            pending_payment: None,
        }
    }

    pub fn state(&self) -> &CheckoutState {
        &self.state
    }

    pub fn hold_id(&self) -> &HoldId {
        &self.hold_id
    }

    pub fn booking(&self) -> Option<&Booking> {
        self.booking.as_ref()
    }

    pub fn snacks(&self) -> &[SnackSelection] {
        &self.snacks
    }

    pub fn pending_payment(&self) -> Option<&PaymentId> {
        self.pending_payment.as_ref()
    }

    /// Load what the review step shows: seats, showtime, expiry
    pub async fn review(&mut self) -> Result<&HoldSummary, CheckoutError> {
        let summary = self.api.hold_summary(&self.hold_id).await?;
        Ok(self.summary.insert(summary))
    }

    pub fn proceed_to_snacks(&mut self) -> Result<(), CheckoutError> {
        self.apply(CheckoutEvent::Proceed)
    }

    /// One step back. An existing booking is kept.
    pub fn back(&mut self) -> Result<(), CheckoutError> {
        self.apply(CheckoutEvent::Back)
    }

    pub fn set_snacks(&mut self, snacks: Vec<SnackSelection>) -> Result<(), CheckoutError> {
        if self.booking.is_some() {
            return Err(CheckoutError::SnacksLocked);
        }
        self.snacks = snacks.into_iter().filter(|s| s.quantity > 0).collect();
        Ok(())
    }

    /// SNACKS → PAYMENT. Creates the booking from the hold and chosen
    /// snacks the first time; every later call reuses it.
    pub async fn submit_snacks(&mut self) -> Result<&Booking, CheckoutError> {
        let next = transition(&self.state, CheckoutEvent::SubmitSnacks, self.booking_id())?;
        if matches!(next, CheckoutState::Paying { .. }) {
            debug!(hold_id = %self.hold_id, "Reusing booking for hold");
            self.state = next;
            return self.booking.as_ref().ok_or(CheckoutError::NoBooking);
        }
        self.state = next;

        let request = CreateBookingRequest { hold_id: self.hold_id.clone(), snacks: self.snacks.clone() };
        match self.api.create_booking(&request, &self.idempotency_key).await {
            Ok(booking) => {
                info!(booking_id = %booking.id, hold_id = %self.hold_id, total = booking.total, "Booking created");
                self.apply(CheckoutEvent::BookingCreated(booking.id.clone()))?;
                Ok(self.booking.insert(booking))
            }
            Err(e) => {
                self.apply(CheckoutEvent::BookingRejected)?;
                Err(e.into())
            }
        }
    }

    pub async fn apply_promo(&mut self, code: &str) -> Result<&Booking, CheckoutError> {
        let booking_id = self.require_booking()?;
        let updated = self.api.apply_promo(&booking_id, code).await?;
        Ok(self.booking.insert(updated))
    }

    pub async fn apply_points(&mut self, points: u32) -> Result<&Booking, CheckoutError> {
        let booking_id = self.require_booking()?;
        let updated = self.api.apply_points(&booking_id, points).await?;
        Ok(self.booking.insert(updated))
    }

    pub async fn apply_gift_card(&mut self, code: &str) -> Result<&Booking, CheckoutError> {
        let booking_id = self.require_booking()?;
        let updated = self.api.apply_gift_card(&booking_id, code).await?;
        Ok(self.booking.insert(updated))
    }

    /// Start paying the current total. Settles right away unless the
    /// gateway wants a redirect, in which case `settle` is called from the
    /// payment callback.
    ///
    /// While an earlier payment is still unsettled no new one is started;
    /// the call goes back to waiting on that payment instead.
    pub async fn pay(&mut self, method: PaymentMethod) -> Result<PaymentOutcome, CheckoutError> {
        if matches!(self.state, CheckoutState::Failed { .. }) {
            self.apply(CheckoutEvent::Retry)?;
        }
        if !matches!(self.state, CheckoutState::Paying { .. }) {
            return Err(CheckoutError::InvalidTransition {
                from: self.state.name().to_string(),
                event: "PAY".to_string(),
            });
        }

        if let Some(payment_id) = self.pending_payment.clone() {
            info!(%payment_id, "Resuming unsettled payment");
            return self.settle(&payment_id).await;
        }

        let booking = self.booking.clone().ok_or(CheckoutError::NoBooking)?;
        let session = self.payments.initiate(&booking, method).await?;
        self.pending_payment = Some(session.payment_id.clone());
        if let Some(url) = session.payment_url {
            return Ok(PaymentOutcome::RedirectRequired { payment_id: session.payment_id, url });
        }
        self.settle(&session.payment_id).await
    }

    pub async fn settle(&mut self, payment_id: &PaymentId) -> Result<PaymentOutcome, CheckoutError> {
        let booking_id = self.require_booking()?;
        self.pending_payment = Some(payment_id.clone());
        let outcome = self.payments.await_settlement(&booking_id, payment_id).await;

        match &outcome {
            PaymentOutcome::Succeeded { booking } => {
                self.pending_payment = None;
                self.apply(CheckoutEvent::PaymentSucceeded)?;
                self.booking = Some(booking.clone());
            }
            PaymentOutcome::Failed { reason } => {
                self.pending_payment = None;
                self.apply(CheckoutEvent::PaymentFailed(reason.clone()))?;
            }
            PaymentOutcome::TimedOut { .. } | PaymentOutcome::RedirectRequired { .. } => {}
        }
        Ok(outcome)
    }

    fn booking_id(&self) -> Option<&BookingId> {
        self.booking.as_ref().map(|b| &b.id)
    }

    fn require_booking(&self) -> Result<BookingId, CheckoutError> {
        self.booking_id().cloned().ok_or(CheckoutError::NoBooking)
    }

    fn apply(&mut self, event: CheckoutEvent) -> Result<(), CheckoutError> {
        self.state = transition(&self.state, event, self.booking_id())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_core::mock::{ApiCall, MockCinemaApi, MOCK_SNACK_PRICE};
    use reel_core::{ApiError, TokioClock};
    use reel_shared::{BookingStatus, HoldRequest, PaymentStatusReport, Seat};
    use std::time::Duration;

    async fn setup() -> (Arc<MockCinemaApi>, CheckoutPipeline) {
        let api = Arc::new(
            MockCinemaApi::new(Arc::new(TokioClock::new()))
                .with_seats(
                    "st-1",
                    vec![Seat::new("A1", "A", 1).with_price(90_000), Seat::new("A2", "A", 2).with_price(90_000)],
                )
                .with_promo("SUMMER20", 36_000)
                .with_gift_card("GIFT-50", 50_000),
        );
        let grant = api
            .create_hold(&HoldRequest { showtime_id: "st-1".into(), seat_ids: vec!["A1".into(), "A2".into()] })
            .await
            .unwrap();
        let payments = PaymentOrchestrator::new(api.clone(), Duration::from_secs(3), Duration::from_secs(300));
        let pipeline = CheckoutPipeline::new(api.clone(), payments, grant.hold_id);
        (api, pipeline)
    }

    fn bookings_created(api: &MockCinemaApi) -> usize {
        api.count_calls(|c| matches!(c, ApiCall::CreateBooking { .. }))
    }

    #[tokio::test]
    async fn test_review_loads_hold_summary() {
        let (_api, mut pipeline) = setup().await;
        let summary = pipeline.review().await.unwrap();

        assert_eq!(summary.seats.len(), 2);
        assert_eq!(summary.seat_total(), 180_000);
    }

    #[tokio::test]
    async fn test_double_submit_creates_one_booking() {
        let (api, mut pipeline) = setup().await;
        pipeline.proceed_to_snacks().unwrap();

        let first = pipeline.submit_snacks().await.unwrap().id.clone();
        // double click
        let second = pipeline.submit_snacks().await;
        assert!(second.is_err());

        // navigate back and re-submit
        pipeline.back().unwrap();
        let again = pipeline.submit_snacks().await.unwrap().id.clone();

        assert_eq!(first, again);
        assert_eq!(bookings_created(&api), 1);
        assert_eq!(pipeline.state(), &CheckoutState::Paying { booking_id: first });
    }

    #[tokio::test]
    async fn test_snacks_are_sent_and_then_locked() {
        let (api, mut pipeline) = setup().await;
        pipeline.proceed_to_snacks().unwrap();
        pipeline
            .set_snacks(vec![
                SnackSelection { snack_id: "popcorn".into(), quantity: 2 },
                SnackSelection { snack_id: "soda".into(), quantity: 0 },
            ])
            .unwrap();

        let booking = pipeline.submit_snacks().await.unwrap();
        assert_eq!(booking.snacks.len(), 1);
        assert_eq!(booking.total, 180_000 + 2 * MOCK_SNACK_PRICE);

        assert!(matches!(pipeline.set_snacks(vec![]), Err(CheckoutError::SnacksLocked)));
        assert_eq!(bookings_created(&api), 1);
    }

    #[tokio::test]
    async fn test_booking_failure_returns_to_snacks() {
        let (api, mut pipeline) = setup().await;
        api.release_hold(pipeline.hold_id()).await.unwrap();
        pipeline.proceed_to_snacks().unwrap();

        let err = pipeline.submit_snacks().await.unwrap_err();
        assert!(matches!(err, CheckoutError::Api(ApiError::Status { status: 404, .. })));
        assert_eq!(pipeline.state(), &CheckoutState::SelectingSnacks);
        assert!(pipeline.booking().is_none());
    }

    #[tokio::test]
    async fn test_discounts_need_a_booking_and_are_repeatable() {
        let (_api, mut pipeline) = setup().await;
        assert!(matches!(pipeline.apply_promo("SUMMER20").await, Err(CheckoutError::NoBooking)));

        pipeline.proceed_to_snacks().unwrap();
        pipeline.submit_snacks().await.unwrap();

        pipeline.apply_gift_card("GIFT-50").await.unwrap();
        pipeline.apply_promo("SUMMER20").await.unwrap();
        let booking = pipeline.apply_promo("SUMMER20").await.unwrap();
        assert_eq!(booking.discount, 86_000);
        assert_eq!(booking.total, 94_000);

        // back to review keeps the booking
        pipeline.back().unwrap();
        pipeline.back().unwrap();
        assert_eq!(pipeline.state(), &CheckoutState::Reviewing);
        assert_eq!(pipeline.apply_points(1_000).await.unwrap().total, 93_000);
    }

    #[tokio::test]
    async fn test_pay_requires_payment_step() {
        let (_api, mut pipeline) = setup().await;
        assert!(matches!(
            pipeline.pay(PaymentMethod::Card).await,
            Err(CheckoutError::InvalidTransition { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_payment_can_be_retried() {
        let (api, mut pipeline) = setup().await;
        pipeline.proceed_to_snacks().unwrap();
        pipeline.submit_snacks().await.unwrap();

        api.push_payment_status(PaymentStatusReport::failed("Card declined"));
        let outcome = pipeline.pay(PaymentMethod::Card).await.unwrap();
        assert_eq!(outcome, PaymentOutcome::Failed { reason: "Card declined".to_string() });
        assert_eq!(pipeline.state(), &CheckoutState::Failed { reason: "Card declined".to_string() });

        api.push_payment_status(PaymentStatusReport::success());
        let outcome = pipeline.pay(PaymentMethod::Card).await.unwrap();
        assert!(matches!(outcome, PaymentOutcome::Succeeded { .. }));
        assert_eq!(pipeline.booking().unwrap().status, BookingStatus::Confirmed);
        assert!(matches!(pipeline.state(), CheckoutState::Completed { .. }));
        assert_eq!(api.count_calls(|c| matches!(c, ApiCall::InitiatePayment(_))), 2);
    }

    #[tokio::test]
    async fn test_gateway_redirect_defers_settlement() {
        let api = Arc::new(
            MockCinemaApi::new(Arc::new(TokioClock::new()))
                .with_seats("st-1", vec![Seat::new("A1", "A", 1).with_price(50_000)])
                .with_payment_url("https://pay.example.com/checkout/1"),
        );
        let grant = api
            .create_hold(&HoldRequest { showtime_id: "st-1".into(), seat_ids: vec!["A1".into()] })
            .await
            .unwrap();
        let payments = PaymentOrchestrator::new(api.clone(), Duration::from_secs(3), Duration::from_secs(300));
        let mut pipeline = CheckoutPipeline::new(api.clone(), payments, grant.hold_id);
        pipeline.proceed_to_snacks().unwrap();
        pipeline.submit_snacks().await.unwrap();

        let outcome = pipeline.pay(PaymentMethod::EWallet).await.unwrap();
        let PaymentOutcome::RedirectRequired { payment_id, url } = outcome else {
            panic!("expected a redirect");
        };
        assert_eq!(url, "https://pay.example.com/checkout/1");
        assert_eq!(api.count_calls(|c| matches!(c, ApiCall::PaymentStatus(_))), 0);

        api.push_payment_status(PaymentStatusReport::success());
        let settled = pipeline.settle(&payment_id).await.unwrap();
        assert!(matches!(settled, PaymentOutcome::Succeeded { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_error_does_not_start_a_second_payment() {
        let (api, mut pipeline) = setup().await;
        pipeline.proceed_to_snacks().unwrap();
        pipeline.submit_snacks().await.unwrap();

        api.push_payment_status(PaymentStatusReport::pending());
        api.push_payment_error(ApiError::Transport("connection reset".to_string()));
        api.push_payment_status(PaymentStatusReport::success());
        let outcome = pipeline.pay(PaymentMethod::Card).await.unwrap();

        assert!(matches!(outcome, PaymentOutcome::Succeeded { .. }));
        assert!(matches!(pipeline.state(), CheckoutState::Completed { .. }));
        assert!(pipeline.pending_payment().is_none());
        assert_eq!(api.count_calls(|c| matches!(c, ApiCall::InitiatePayment(_))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_payment_is_resumed_not_restarted() {
        let (api, mut pipeline) = setup().await;
        pipeline.proceed_to_snacks().unwrap();
        pipeline.submit_snacks().await.unwrap();

        api.push_payment_status(PaymentStatusReport::success());
        for _ in 0..3 {
            api.push_confirm_error(ApiError::Transport("connection reset".to_string()));
        }
        let outcome = pipeline.pay(PaymentMethod::Card).await.unwrap();
        let PaymentOutcome::TimedOut { payment_id } = outcome else {
            panic!("expected an unknown outcome, got {:?}", outcome);
        };
        assert_eq!(pipeline.pending_payment(), Some(&payment_id));
        assert!(matches!(pipeline.state(), CheckoutState::Paying { .. }));

        api.push_payment_status(PaymentStatusReport::success());
        let outcome = pipeline.pay(PaymentMethod::Card).await.unwrap();

        assert!(matches!(outcome, PaymentOutcome::Succeeded { .. }));
        assert_eq!(api.count_calls(|c| matches!(c, ApiCall::InitiatePayment(_))), 1);
        assert!(api
            .calls()
            .iter()
            .filter_map(|c| match c {
                ApiCall::PaymentStatus(id) => Some(id),
                _ => None,
            })
            .all(|id| *id == payment_id));
    }
}
