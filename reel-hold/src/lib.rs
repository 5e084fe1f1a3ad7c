pub mod coordinator;
pub mod countdown;
pub mod conflicts;

pub use coordinator::{HoldCoordinator, HoldError, HoldOutcome};
pub use countdown::{format_remaining, Countdown, HoldExpired};
pub use conflicts::{
    conflict_channel, spawn_realtime_forwarder, ConflictReconciler, ConflictSender, ConflictSignal,
    RealtimeHandle,
};
