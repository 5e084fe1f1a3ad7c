pub mod checkout;
pub mod payment;
pub mod pipeline;

pub use checkout::{transition, CheckoutError, CheckoutEvent, CheckoutState};
pub use payment::{PaymentOrchestrator, PaymentOutcome};
pub use pipeline::CheckoutPipeline;
