use reel_shared::{Seat, SeatId};
use std::collections::BTreeSet;

/// The shopper's picked seats plus the seats currently believed lost to
/// contention. The two sets never intersect.
#[derive(Debug, Clone)]
pub struct SeatSelection {
    selected: Vec<SeatId>,
    conflicted: BTreeSet<SeatId>,
    max_seats: usize,
    locked: bool,
}

impl SeatSelection {
    pub fn new(max_seats: usize) -> Self {
        Self { selected: Vec::new(), conflicted: BTreeSet::new(), max_seats, locked: false }
    }

    /// Select or deselect a seat. Any accepted toggle clears the conflicted
    /// set, since the shopper has reacted to it.
    pub fn toggle(&mut self, seat: &Seat) -> Result<bool, SelectionError> {
        if self.locked {
            return Err(SelectionError::Locked);
        }

        if let Some(pos) = self.selected.iter().position(|id| id == &seat.id) {
            self.selected.remove(pos);
            self.conflicted.clear();
            return Ok(false);
        }

        if !seat.is_selectable() {
            return Err(SelectionError::Unavailable(seat.id.clone()));
        }
        if self.selected.len() >= self.max_seats {
            return Err(SelectionError::LimitReached(self.max_seats));
        }

        self.selected.push(seat.id.clone());
        self.conflicted.clear();
        Ok(true)
    }

    /// Drop every given seat from the selection and remember it as conflicted
    pub fn mark_conflicted<'a>(&mut self, seat_ids: impl IntoIterator<Item = &'a SeatId>) -> Vec<SeatId> {
        let mut pruned = Vec::new();
        for id in seat_ids {
            if let Some(pos) = self.selected.iter().position(|s| s == id) {
                pruned.push(self.selected.remove(pos));
            }
            self.conflicted.insert(id.clone());
        }
        pruned
    }

    pub fn clear_conflicts(&mut self) {
        self.conflicted.clear();
    }

    /// Forget the whole selection (hold expired or inventory may have shifted)
    pub fn clear(&mut self) {
        self.selected.clear();
        self.locked = false;
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn selected(&self) -> &[SeatId] {
        &self.selected
    }

    pub fn conflicted(&self) -> &BTreeSet<SeatId> {
        &self.conflicted
    }

    pub fn contains(&self, seat_id: &SeatId) -> bool {
        self.selected.contains(seat_id)
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectionError {
    #[error("Seats are held; release the hold to change them")]
    Locked,

    #[error("Seat {0} is not available")]
    Unavailable(SeatId),

    #[error("At most {0} seats per booking")]
    LimitReached(usize),

    #[error("Seat {0} is not part of this showtime")]
    UnknownSeat(SeatId),
}
