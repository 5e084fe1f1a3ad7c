pub mod error;
pub mod api;
pub mod clock;
pub mod poll;
pub mod mock;

pub use error::ApiError;
pub use api::{ApiResult, CinemaApi, ConflictFeed, ConflictStream};
pub use clock::{remaining_until, Clock, SystemClock, TokioClock};
pub use poll::{PollOutcome, Poller};
