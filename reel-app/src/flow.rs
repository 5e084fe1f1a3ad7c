use reel_catalog::{InventoryView, RefreshHandle, SeatSelection, SelectionError};
use reel_core::ApiError;
use reel_hold::{
    conflict_channel, spawn_realtime_forwarder, ConflictReconciler, Countdown, HoldCoordinator, HoldError,
    HoldExpired, HoldOutcome, RealtimeHandle,
};
use reel_order::{CheckoutError, CheckoutPipeline, PaymentOrchestrator, PaymentOutcome};
use reel_shared::{Hold, HoldId, PaymentId, PaymentMethod, SeatId, ShowtimeId};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::session::ClientSession;

/// Something the shopper has to be told about
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Seats another shopper secured first
    ConflictBanner { seat_ids: Vec<SeatId> },
    /// Blocking modal; the shopper starts over from the seat map
    HoldExpired,
    /// Toast
    Error { message: String },
    /// Payment outcome unknown, check order history
    PaymentTimedOut,
}

/// What `next_event` applied
#[derive(Debug, Clone, PartialEq)]
pub enum FlowEvent {
    HoldExpired(HoldId),
    /// Seats pruned from the selection; empty when the report did not
    /// touch anything selected
    Conflict(Vec<SeatId>),
}

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Could not load seats: {0}")]
    Inventory(ApiError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Hold(#[from] HoldError),
    #[error("No seats are held")]
    NoHold,
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
}

/// One shopper's pass through a showtime: seat map, hold, checkout.
///
/// Owns every background task it starts (inventory refresh, countdown,
/// realtime forwarder); all of them stop when the flow is dropped.
pub struct BookingFlow {
    session: ClientSession,
    inventory: InventoryView,
    selection: SeatSelection,
    holds: HoldCoordinator,
    reconciler: ConflictReconciler,
    countdown: Countdown,
    expired_rx: mpsc::UnboundedReceiver<HoldExpired>,
    checkout: Option<CheckoutPipeline>,
    notices: Vec<Notice>,
    _refresh: RefreshHandle,
    _realtime: Option<RealtimeHandle>,
}

impl BookingFlow {
    /// Load the seat map and start the background refresh. A failed first
    /// load is returned so the caller can offer a full-page retry.
    pub async fn open(session: ClientSession, showtime_id: ShowtimeId) -> Result<Self, FlowError> {
        let settings = session.settings.clone();
        let inventory = InventoryView::open(session.api.clone(), showtime_id.clone())
            .await
            .map_err(FlowError::Inventory)?;
        let refresh = inventory.spawn_refresh(settings.seat_refresh);

        let (sender, reconciler) = conflict_channel(showtime_id.clone());
        let realtime = session.feed.clone().map(|feed| {
            spawn_realtime_forwarder(feed, showtime_id.clone(), sender.clone(), settings.reconnect_delay)
        });
        let holds = HoldCoordinator::new(session.api.clone(), sender);
        let (countdown, expired_rx) = Countdown::new(session.clock.clone(), settings.countdown_tick);

        info!(%showtime_id, seats = inventory.state().seats().len(), "Booking flow opened");
        Ok(Self {
            session,
            inventory,
            selection: SeatSelection::new(settings.max_seats),
            holds,
            reconciler,
            countdown,
            expired_rx,
            checkout: None,
            notices: Vec::new(),
            _refresh: refresh,
            _realtime: realtime,
        })
    }

    pub fn showtime_id(&self) -> &ShowtimeId {
        self.inventory.showtime_id()
    }

    pub fn inventory(&self) -> &InventoryView {
        &self.inventory
    }

    pub fn selection(&self) -> &SeatSelection {
        &self.selection
    }

    pub fn active_hold(&self) -> Option<&Hold> {
        self.holds.active()
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn checkout(&self) -> Option<&CheckoutPipeline> {
        self.checkout.as_ref()
    }

    /// Checkout steps for the current hold; `NoHold` before one is granted
    pub fn checkout_mut(&mut self) -> Result<&mut CheckoutPipeline, FlowError> {
        self.checkout.as_mut().ok_or(FlowError::NoHold)
    }

    pub fn toggle_seat(&mut self, seat_id: &SeatId) -> Result<bool, FlowError> {
        let seat = self
            .inventory
            .seat(seat_id)
            .ok_or_else(|| SelectionError::UnknownSeat(seat_id.clone()))?;
        Ok(self.selection.toggle(&seat)?)
    }

    /// Hold the selected seats. On success the countdown starts and
    /// checkout opens for the new hold.
    pub async fn hold_seats(&mut self) -> Result<HoldOutcome, FlowError> {
        let showtime_id = self.inventory.showtime_id().clone();
        match self.holds.request(&showtime_id, &mut self.selection).await {
            Ok(HoldOutcome::Held(hold)) => {
                self.countdown.arm(hold.hold_id.clone(), hold.expires_at);
                let settings = &self.session.settings;
                let payments = PaymentOrchestrator::new(
                    self.session.api.clone(),
                    settings.payment_poll,
                    settings.payment_max_wait,
                );
                self.checkout = Some(CheckoutPipeline::new(self.session.api.clone(), payments, hold.hold_id.clone()));
                Ok(HoldOutcome::Held(hold))
            }
            Ok(HoldOutcome::Conflicted(seat_ids)) => {
                self.reconciler.drain(&mut self.selection);
                self.notices.push(Notice::ConflictBanner { seat_ids: seat_ids.clone() });
                self.refetch().await;
                Ok(HoldOutcome::Conflicted(seat_ids))
            }
            Ok(HoldOutcome::Skipped) => Ok(HoldOutcome::Skipped),
            Err(e) => {
                let HoldError::Request(api_error) = &e;
                self.notices.push(Notice::Error { message: api_error.user_message() });
                self.refetch().await;
                Err(e.into())
            }
        }
    }

    /// Wait for the next hold expiry or seat conflict and apply it. Expiries
    /// of holds that were already replaced or consumed are skipped.
    pub async fn next_event(&mut self) -> Option<FlowEvent> {
        loop {
            tokio::select! {
                Some(expired) = self.expired_rx.recv() => {
                    if !self.countdown.is_current(&expired) {
                        debug!(hold_id = %expired.hold_id, "Ignoring expiry of a stale hold");
                        continue;
                    }
                    self.expire().await;
                    return Some(FlowEvent::HoldExpired(expired.hold_id));
                }
                Some(signal) = self.reconciler.recv() => {
                    let seat_ids = self.reconciler.apply(signal, &mut self.selection);
                    if !seat_ids.is_empty() {
                        self.notices.push(Notice::ConflictBanner { seat_ids: seat_ids.clone() });
                    }
                    return Some(FlowEvent::Conflict(seat_ids));
                }
                else => return None,
            }
        }
    }

    /// Pay for the booking. A settled payment consumes the hold: the
    /// countdown stops and leaving no longer releases it.
    pub async fn pay(&mut self, method: PaymentMethod) -> Result<PaymentOutcome, FlowError> {
        let result = self.checkout_mut()?.pay(method).await;
        self.after_payment(result)
    }

    /// Resume after the shopper comes back from the gateway's page
    pub async fn settle(&mut self, payment_id: &PaymentId) -> Result<PaymentOutcome, FlowError> {
        let result = self.checkout_mut()?.settle(payment_id).await;
        self.after_payment(result)
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Navigate away. Releases a hold no booking has consumed.
    pub async fn leave(mut self) {
        self.countdown.disarm();
        self.checkout = None;
        if let Some(hold_id) = self.holds.release().await {
            info!(%hold_id, "Left booking flow, hold released");
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.countdown.remaining()
    }

    async fn expire(&mut self) {
        self.countdown.disarm();
        self.holds.release().await;
        self.checkout = None;
        self.selection.clear();
        self.refetch().await;
        self.notices.push(Notice::HoldExpired);
    }

    fn after_payment(&mut self, result: Result<PaymentOutcome, CheckoutError>) -> Result<PaymentOutcome, FlowError> {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = match &e {
                    CheckoutError::Api(api_error) => api_error.user_message(),
                    other => other.to_string(),
                };
                warn!("Payment request failed: {}", e);
                self.notices.push(Notice::Error { message });
                return Err(e.into());
            }
        };
        match &outcome {
            PaymentOutcome::Succeeded { booking } => {
                self.countdown.disarm();
                self.holds.forget();
                info!(booking_id = %booking.id, "Booking paid");
            }
            PaymentOutcome::Failed { reason } => {
                self.notices.push(Notice::Error { message: reason.clone() });
            }
            PaymentOutcome::TimedOut { payment_id } => {
                warn!(%payment_id, "Payment status unknown");
                self.notices.push(Notice::PaymentTimedOut);
            }
            PaymentOutcome::RedirectRequired { .. } => {}
        }
        Ok(outcome)
    }

    async fn refetch(&self) {
        if let Err(e) = self.inventory.refresh().await {
            debug!(showtime_id = %self.inventory.showtime_id(), "Seat refetch failed: {}", e);
        }
    }
}

impl Drop for BookingFlow {
    fn drop(&mut self) {
        self.holds.release_detached();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FlowSettings;
    use reel_catalog::InventoryState;
    use reel_core::mock::{ApiCall, MockCinemaApi, MockConflictFeed};
    use reel_core::{ConflictFeed, TokioClock};
    use reel_shared::{BookingStatus, PaymentStatusReport, Seat, SeatConflictEvent, SeatStatus};
    use std::sync::Arc;

    fn row(ids: &[&str]) -> Vec<Seat> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| Seat::new(*id, &id[..1], i as u32 + 1).with_price(90_000))
            .collect()
    }

    fn mock(seats: &[&str]) -> Arc<MockCinemaApi> {
        Arc::new(MockCinemaApi::new(Arc::new(TokioClock::new())).with_seats("st-1", row(seats)))
    }

    fn session(api: Arc<MockCinemaApi>) -> ClientSession {
        ClientSession::new(api, Arc::new(TokioClock::new())).with_settings(FlowSettings::default())
    }

    fn count(api: &MockCinemaApi, pred: impl Fn(&ApiCall) -> bool) -> usize {
        api.count_calls(pred)
    }

    fn ids(values: &[&str]) -> Vec<SeatId> {
        values.iter().map(|v| SeatId::from(*v)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_fails_when_seats_cannot_load() {
        let api = mock(&["A1"]);
        api.push_seats_failure(ApiError::status(503, "Service unavailable"));

        let result = BookingFlow::open(session(api), "st-1".into()).await;
        assert!(matches!(result, Err(FlowError::Inventory(ApiError::Status { status: 503, .. }))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_seat_is_rejected() {
        let mut flow = BookingFlow::open(session(mock(&["A1"])), "st-1".into()).await.unwrap();
        let err = flow.toggle_seat(&"Z9".into()).unwrap_err();
        assert!(matches!(err, FlowError::Selection(SelectionError::UnknownSeat(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_then_recovery() {
        let api = mock(&["B1", "B2", "B3"]);
        let mut flow = BookingFlow::open(session(api.clone()), "st-1".into()).await.unwrap();
        flow.toggle_seat(&"B1".into()).unwrap();
        flow.toggle_seat(&"B2".into()).unwrap();
        api.mark_taken(&"st-1".into(), &ids(&["B1"]));

        let outcome = flow.hold_seats().await.unwrap();
        assert_eq!(outcome, HoldOutcome::Conflicted(ids(&["B1"])));
        assert_eq!(flow.selection().selected(), ids(&["B2"]).as_slice());
        assert!(flow.selection().conflicted().contains(&SeatId::from("B1")));
        assert_eq!(flow.take_notices(), vec![Notice::ConflictBanner { seat_ids: ids(&["B1"]) }]);
        assert_eq!(flow.inventory().seat(&"B1".into()).unwrap().status, SeatStatus::Booked);

        flow.toggle_seat(&"B3".into()).unwrap();
        assert!(flow.selection().conflicted().is_empty());
        assert_eq!(flow.selection().selected(), ids(&["B2", "B3"]).as_slice());

        assert!(matches!(flow.hold_seats().await.unwrap(), HoldOutcome::Held(_)));
        assert!(flow.selection().is_locked());
        assert!(flow.checkout().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_hold_failure_clears_selection() {
        let api = mock(&["A1", "A2"]);
        let mut flow = BookingFlow::open(session(api.clone()), "st-1".into()).await.unwrap();
        flow.toggle_seat(&"A1".into()).unwrap();
        api.push_hold_result(Err(ApiError::status(500, "Hold service down")));

        let err = flow.hold_seats().await.unwrap_err();
        assert!(matches!(err, FlowError::Hold(HoldError::Request(_))));
        assert!(flow.selection().is_empty());
        assert!(flow.active_hold().is_none());
        assert_eq!(flow.take_notices(), vec![Notice::Error { message: "Hold service down".to_string() }]);
        assert_eq!(count(&api, |c| matches!(c, ApiCall::Seats(_))), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_mid_checkout() {
        let api = Arc::new(
            MockCinemaApi::new(Arc::new(TokioClock::new()))
                .with_seats("st-1", row(&["A1", "A2"]))
                .with_hold_ttl(chrono::Duration::seconds(5)),
        );
        let mut flow = BookingFlow::open(session(api.clone()), "st-1".into()).await.unwrap();
        flow.toggle_seat(&"A1".into()).unwrap();
        let HoldOutcome::Held(hold) = flow.hold_seats().await.unwrap() else {
            panic!("expected a hold");
        };
        flow.checkout_mut().unwrap().proceed_to_snacks().unwrap();
        let seat_loads = count(&api, |c| matches!(c, ApiCall::Seats(_)));

        let event = flow.next_event().await;
        assert_eq!(event, Some(FlowEvent::HoldExpired(hold.hold_id.clone())));
        assert!(flow.active_hold().is_none());
        assert!(flow.checkout().is_none());
        assert!(flow.selection().is_empty());
        assert!(!flow.selection().is_locked());
        assert_eq!(flow.take_notices(), vec![Notice::HoldExpired]);
        assert_eq!(count(&api, |c| matches!(c, ApiCall::ReleaseHold(_))), 1);
        assert_eq!(count(&api, |c| matches!(c, ApiCall::Seats(_))), seat_loads + 1);
        assert_eq!(flow.inventory().seat(&"A1".into()).unwrap().status, SeatStatus::Available);

        // exactly once per hold
        let again = tokio::time::timeout(Duration::from_secs(60), flow.next_event()).await;
        assert!(again.is_err());
        assert!(flow.take_notices().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_hold_gets_its_own_expiry() {
        let api = Arc::new(
            MockCinemaApi::new(Arc::new(TokioClock::new()))
                .with_seats("st-1", row(&["A1", "A2"]))
                .with_hold_ttl(chrono::Duration::seconds(5)),
        );
        let mut flow = BookingFlow::open(session(api.clone()), "st-1".into()).await.unwrap();

        flow.toggle_seat(&"A1".into()).unwrap();
        flow.hold_seats().await.unwrap();
        assert!(matches!(flow.next_event().await, Some(FlowEvent::HoldExpired(_))));

        flow.toggle_seat(&"A2".into()).unwrap();
        let HoldOutcome::Held(second) = flow.hold_seats().await.unwrap() else {
            panic!("expected a hold");
        };
        assert_eq!(flow.next_event().await, Some(FlowEvent::HoldExpired(second.hold_id)));
        assert_eq!(flow.take_notices(), vec![Notice::HoldExpired, Notice::HoldExpired]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_realtime_conflict_prunes_selection() {
        let api = mock(&["A1", "A2", "A3"]);
        let feed = Arc::new(MockConflictFeed::new());
        let session = session(api).with_feed(feed.clone() as Arc<dyn ConflictFeed>);
        let mut flow = BookingFlow::open(session, "st-1".into()).await.unwrap();
        flow.toggle_seat(&"A1".into()).unwrap();
        flow.toggle_seat(&"A2".into()).unwrap();

        while feed.subscription_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        let delivered = feed.publish(SeatConflictEvent {
            showtime_id: "st-1".into(),
            seat_ids: ids(&["A2", "A3"]),
            occurred_at: chrono::Utc::now(),
        });
        assert_eq!(delivered, 1);

        assert_eq!(flow.next_event().await, Some(FlowEvent::Conflict(ids(&["A2"]))));
        assert_eq!(flow.selection().selected(), ids(&["A1"]).as_slice());
        assert_eq!(flow.take_notices(), vec![Notice::ConflictBanner { seat_ids: ids(&["A2"]) }]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paid_hold_is_not_released() {
        let api = mock(&["A1", "A2"]);
        let mut flow = BookingFlow::open(session(api.clone()), "st-1".into()).await.unwrap();
        flow.toggle_seat(&"A1".into()).unwrap();
        flow.toggle_seat(&"A2".into()).unwrap();
        flow.hold_seats().await.unwrap();

        let checkout = flow.checkout_mut().unwrap();
        checkout.proceed_to_snacks().unwrap();
        checkout.submit_snacks().await.unwrap();
        api.push_payment_status(PaymentStatusReport::pending());
        api.push_payment_status(PaymentStatusReport::success());

        let outcome = flow.pay(PaymentMethod::Card).await.unwrap();
        let PaymentOutcome::Succeeded { booking } = outcome else {
            panic!("expected success");
        };
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert!(flow.remaining().is_none());
        assert!(flow.active_hold().is_none());

        flow.leave().await;
        assert_eq!(count(&api, |c| matches!(c, ApiCall::ReleaseHold(_))), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_releases_unpaid_hold() {
        let api = mock(&["A1"]);
        let mut flow = BookingFlow::open(session(api.clone()), "st-1".into()).await.unwrap();
        flow.toggle_seat(&"A1".into()).unwrap();
        let HoldOutcome::Held(hold) = flow.hold_seats().await.unwrap() else {
            panic!("expected a hold");
        };

        flow.leave().await;
        assert_eq!(count(&api, |c| matches!(c, ApiCall::ReleaseHold(_))), 1);
        assert!(api.active_hold(&hold.hold_id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_in_background() {
        let api = mock(&["A1"]);
        let mut flow = BookingFlow::open(session(api.clone()), "st-1".into()).await.unwrap();
        flow.toggle_seat(&"A1".into()).unwrap();
        flow.hold_seats().await.unwrap();

        drop(flow);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count(&api, |c| matches!(c, ApiCall::ReleaseHold(_))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_payment_timeout_raises_notice() {
        let api = mock(&["A1"]);
        let mut flow = BookingFlow::open(session(api.clone()), "st-1".into()).await.unwrap();
        flow.toggle_seat(&"A1".into()).unwrap();
        flow.hold_seats().await.unwrap();
        let checkout = flow.checkout_mut().unwrap();
        checkout.proceed_to_snacks().unwrap();
        checkout.submit_snacks().await.unwrap();

        let outcome = flow.pay(PaymentMethod::BankTransfer).await.unwrap();
        assert!(matches!(outcome, PaymentOutcome::TimedOut { .. }));
        assert_eq!(flow.take_notices(), vec![Notice::PaymentTimedOut]);
        assert!(matches!(flow.inventory().state(), InventoryState::Ready(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_payment_errors_raise_notice() {
        let api = mock(&["A1"]);
        let mut flow = BookingFlow::open(session(api.clone()), "st-1".into()).await.unwrap();
        flow.toggle_seat(&"A1".into()).unwrap();
        flow.hold_seats().await.unwrap();

        let err = flow.pay(PaymentMethod::Card).await.unwrap_err();
        assert!(matches!(err, FlowError::Checkout(CheckoutError::InvalidTransition { .. })));
        assert!(matches!(flow.take_notices().as_slice(), [Notice::Error { .. }]));

        let checkout = flow.checkout_mut().unwrap();
        checkout.proceed_to_snacks().unwrap();
        checkout.submit_snacks().await.unwrap();
        api.push_initiate_error(ApiError::Transport("connection reset".to_string()));

        let err = flow.pay(PaymentMethod::Card).await.unwrap_err();
        assert!(matches!(err, FlowError::Checkout(CheckoutError::Api(ApiError::Transport(_)))));
        assert_eq!(
            flow.take_notices(),
            vec![Notice::Error { message: "Network error, please try again".to_string() }]
        );
        assert!(flow.active_hold().is_some());
    }
}
