pub mod ids;
pub mod seat;
pub mod hold;
pub mod booking;
pub mod payment;
pub mod envelope;
pub mod events;
