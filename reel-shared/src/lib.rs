pub mod models;

pub use models::ids::{BookingId, HoldId, PaymentId, SeatId, ShowtimeId, SnackId};
pub use models::seat::{Seat, SeatStatus, SeatType};
pub use models::hold::{Hold, HoldGrant, HoldRequest, HoldSummary, ShowtimeInfo};
pub use models::booking::{
    ApplyGiftCardRequest, ApplyPointsRequest, ApplyPromoRequest, Booking, BookingStatus,
    CreateBookingRequest, SnackSelection,
};
pub use models::payment::{
    InitiatePaymentRequest, PaymentMethod, PaymentSession, PaymentStatus, PaymentStatusReport,
};
pub use models::envelope::{ApiErrorBody, ConflictDetails, Envelope};
pub use models::events::SeatConflictEvent;
