use reel_core::{ApiError, CinemaApi, PollOutcome, Poller};
use reel_shared::{Booking, BookingId, InitiatePaymentRequest, PaymentId, PaymentMethod, PaymentSession, PaymentStatus};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// A paid booking that cannot be confirmed after this many tries is
/// reported as unknown rather than failed
const CONFIRM_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    /// Paid and confirmed; show the tickets
    Succeeded { booking: Booking },
    /// Declined; the booking can be paid again
    Failed { reason: String },
    /// Gave up waiting. The charge may still have gone through, so the
    /// shopper is sent to order history rather than told it failed.
    TimedOut { payment_id: PaymentId },
    /// The gateway needs the shopper on its own page first
    RedirectRequired { payment_id: PaymentId, url: String },
}

/// Starts payments and watches them to a terminal status
pub struct PaymentOrchestrator {
    api: Arc<dyn CinemaApi>,
    poller: Poller,
}

impl PaymentOrchestrator {
    pub fn new(api: Arc<dyn CinemaApi>, poll_interval: Duration, max_wait: Duration) -> Self {
        Self { api, poller: Poller::new(poll_interval).with_max_wait(max_wait) }
    }

    /// Initiate a payment for the booking's current total
    pub async fn initiate(&self, booking: &Booking, method: PaymentMethod) -> Result<PaymentSession, ApiError> {
        let request = InitiatePaymentRequest {
            booking_id: booking.id.clone(),
            method,
            amount: booking.total,
        };
        let session = self.api.initiate_payment(&request).await?;
        info!(booking_id = %booking.id, payment_id = %session.payment_id, amount = booking.total, "Payment initiated");
        Ok(session)
    }

    /// Poll until SUCCESS or FAILED, then stop. Success confirms the
    /// booking exactly once.
    ///
    /// Once a payment exists the charge may already have gone through, so
    /// nothing here fails outright: a status check that errors counts as
    /// still pending, and a confirm that keeps failing ends as `TimedOut`.
    pub async fn await_settlement(&self, booking_id: &BookingId, payment_id: &PaymentId) -> PaymentOutcome {
        let outcome = self
            .poller
            .run(
                || async move {
                    match self.api.payment_status(payment_id).await {
                        Ok(report) => Ok::<_, Infallible>(Some(report)),
                        Err(e) => {
                            debug!(%payment_id, "Payment status check failed, still waiting: {}", e);
                            Ok(None)
                        }
                    }
                },
                |report| report.as_ref().is_some_and(|r| r.status.is_terminal()),
            )
            .await
            .unwrap_or_else(|never| match never {});

        match outcome {
            PollOutcome::Finished(Some(report)) if report.status == PaymentStatus::Success => {
                self.confirm(booking_id, payment_id).await
            }
            PollOutcome::Finished(Some(report)) => {
                let reason = report.reason.unwrap_or_else(|| "Payment was declined".to_string());
                warn!(%booking_id, %payment_id, "Payment failed: {}", reason);
                PaymentOutcome::Failed { reason }
            }
            PollOutcome::Finished(None) | PollOutcome::TimedOut { .. } => {
                warn!(%booking_id, %payment_id, "Stopped waiting for payment status");
                PaymentOutcome::TimedOut { payment_id: payment_id.clone() }
            }
        }
    }

    async fn confirm(&self, booking_id: &BookingId, payment_id: &PaymentId) -> PaymentOutcome {
        for attempt in 1..=CONFIRM_ATTEMPTS {
            match self.api.confirm_booking(booking_id).await {
                Ok(booking) => {
                    info!(%booking_id, %payment_id, "Payment settled, booking confirmed");
                    return PaymentOutcome::Succeeded { booking };
                }
                Err(e) => {
                    warn!(%booking_id, %payment_id, attempt, "Confirming paid booking failed: {}", e);
                    if attempt < CONFIRM_ATTEMPTS {
                        sleep(self.poller.interval()).await;
                    }
                }
            }
        }
        PaymentOutcome::TimedOut { payment_id: payment_id.clone() }
    }
}
