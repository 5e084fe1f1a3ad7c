pub mod flow;
pub mod session;
pub mod telemetry;

pub use flow::{BookingFlow, FlowError, FlowEvent, Notice};
pub use session::{ClientSession, FlowSettings};
