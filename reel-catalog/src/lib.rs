pub mod inventory;
pub mod selection;

pub use inventory::{InventoryState, InventoryView, RefreshHandle};
pub use selection::{SeatSelection, SelectionError};
