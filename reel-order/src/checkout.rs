use reel_core::ApiError;
use reel_shared::BookingId;

/// Where the shopper is in checkout. A booking, once created, lives
/// outside this state and survives navigating back.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutState {
    Reviewing,
    SelectingSnacks,
    /// Booking creation in flight
    AwaitingBooking,
    Paying { booking_id: BookingId },
    /// Payment failed; retryable against the same booking
    Failed { reason: String },
    /// Paid and confirmed; the shopper leaves for the ticket view
    Completed { booking_id: BookingId },
}

impl CheckoutState {
    pub fn name(&self) -> &'static str {
        match self {
            CheckoutState::Reviewing => "REVIEWING",
            CheckoutState::SelectingSnacks => "SELECTING_SNACKS",
            CheckoutState::AwaitingBooking => "AWAITING_BOOKING",
            CheckoutState::Paying { .. } => "PAYING",
            CheckoutState::Failed { .. } => "FAILED",
            CheckoutState::Completed { .. } => "COMPLETED",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutEvent {
    Proceed,
    Back,
    SubmitSnacks,
    BookingCreated(BookingId),
    BookingRejected,
    PaymentFailed(String),
    Retry,
    PaymentSucceeded,
}

impl CheckoutEvent {
    fn name(&self) -> &'static str {
        match self {
            CheckoutEvent::Proceed => "PROCEED",
            CheckoutEvent::Back => "BACK",
            CheckoutEvent::SubmitSnacks => "SUBMIT_SNACKS",
            CheckoutEvent::BookingCreated(_) => "BOOKING_CREATED",
            CheckoutEvent::BookingRejected => "BOOKING_REJECTED",
            CheckoutEvent::PaymentFailed(_) => "PAYMENT_FAILED",
            CheckoutEvent::Retry => "RETRY",
            CheckoutEvent::PaymentSucceeded => "PAYMENT_SUCCEEDED",
        }
    }
}

/// The whole REVIEW → SNACKS → PAYMENT machine. `existing` is the booking
/// already created for this hold, if any; submitting snacks again skips
/// straight to payment with it.
pub fn transition(
    state: &CheckoutState,
    event: CheckoutEvent,
    existing: Option<&BookingId>,
) -> Result<CheckoutState, CheckoutError> {
    use CheckoutEvent as E;
    use CheckoutState as S;

    let next = match (state, &event) {
        (S::Reviewing, E::Proceed) => S::SelectingSnacks,
        (S::SelectingSnacks, E::Back) => S::Reviewing,
        (S::SelectingSnacks, E::SubmitSnacks) => match existing {
            Some(booking_id) => S::Paying { booking_id: booking_id.clone() },
            None => S::AwaitingBooking,
        },
        (S::AwaitingBooking, E::BookingCreated(booking_id)) => S::Paying { booking_id: booking_id.clone() },
        (S::AwaitingBooking, E::BookingRejected) => S::SelectingSnacks,
        (S::Paying { .. } | S::Failed { .. }, E::Back) => S::SelectingSnacks,
        (S::Paying { .. }, E::PaymentFailed(reason)) => S::Failed { reason: reason.clone() },
        (S::Paying { booking_id }, E::PaymentSucceeded) => S::Completed { booking_id: booking_id.clone() },
        (S::Failed { .. }, E::Retry) => match existing {
            Some(booking_id) => S::Paying { booking_id: booking_id.clone() },
            None => return Err(CheckoutError::NoBooking),
        },
        _ => {
            return Err(CheckoutError::InvalidTransition {
                from: state.name().to_string(),
                event: event.name().to_string(),
            })
        }
    };

    Ok(next)
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Invalid checkout transition from {from} on {event}")]
    InvalidTransition {
        from: String,
        event: String,
    },

    #[error("No booking exists for this hold yet")]
    NoBooking,

    #[error("Snacks are fixed once the booking is created")]
    SnacksLocked,

    #[error(transparent)]
    Api(#[from] ApiError),
}
