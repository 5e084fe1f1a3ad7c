use reel_catalog::SeatSelection;
use reel_core::{ApiError, CinemaApi};
use reel_shared::{Hold, HoldId, HoldRequest, SeatId, ShowtimeId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::conflicts::{ConflictSender, ConflictSignal};

#[derive(Debug, Clone, PartialEq)]
pub enum HoldOutcome {
    /// Nothing selected, no request made
    Skipped,
    Held(Hold),
    /// Another shopper got these first; reported to the reconciler
    Conflicted(Vec<SeatId>),
}

#[derive(Debug, thiserror::Error)]
pub enum HoldError {
    #[error("Hold request failed: {0}")]
    Request(#[from] ApiError),
}

/// Requests and releases server-side seat holds
pub struct HoldCoordinator {
    api: Arc<dyn CinemaApi>,
    conflicts: ConflictSender,
    active: Option<Hold>,
}

impl HoldCoordinator {
    pub fn new(api: Arc<dyn CinemaApi>, conflicts: ConflictSender) -> Self {
        Self { api, conflicts, active: None }
    }

    pub fn active(&self) -> Option<&Hold> {
        self.active.as_ref()
    }

    /// Ask the server to hold the current selection.
    ///
    /// On success the selection is locked until the hold goes away. A
    /// conflict is published to the reconciler, which prunes the seats.
    /// Any other failure clears the whole selection: the client can no
    /// longer tell which seats are still free.
    ///
    /// A repeat request while a hold is active replaces it on success. If
    /// the repeat fails, the active hold and its locked selection are kept
    /// as they were and the error is returned.
    pub async fn request(
        &mut self,
        showtime_id: &ShowtimeId,
        selection: &mut SeatSelection,
    ) -> Result<HoldOutcome, HoldError> {
        if selection.is_empty() {
            debug!(%showtime_id, "Hold skipped, no seats selected");
            return Ok(HoldOutcome::Skipped);
        }

        let request = HoldRequest {
            showtime_id: showtime_id.clone(),
            seat_ids: selection.selected().to_vec(),
        };

        match self.api.create_hold(&request).await {
            Ok(grant) => {
                let hold = Hold::from_grant(request, grant);
                if let Some(previous) = self.active.replace(hold.clone()) {
                    warn!(orphaned = %previous.hold_id, "Replacing an active hold; it will lapse server-side");
                }
                selection.lock();
                info!(
                    hold_id = %hold.hold_id,
                    seats = hold.seat_ids.len(),
                    expires_at = %hold.expires_at,
                    "Seats held"
                );
                Ok(HoldOutcome::Held(hold))
            }
            Err(e) if self.active.is_some() => {
                warn!(%showtime_id, "Repeat hold request failed, keeping the active hold: {}", e);
                Err(HoldError::Request(e))
            }
            Err(ApiError::SeatsUnavailable { seat_ids, .. }) => {
                warn!(%showtime_id, seats = ?seat_ids, "Hold rejected, seats taken");
                self.conflicts.send(ConflictSignal::HoldRejected { seat_ids: seat_ids.clone() });
                Ok(HoldOutcome::Conflicted(seat_ids))
            }
            Err(e) => {
                warn!(%showtime_id, "Hold request failed: {}", e);
                selection.clear();
                Err(HoldError::Request(e))
            }
        }
    }

    /// Best-effort release. Never fails: an expired or consumed hold is
    /// already gone server-side.
    pub async fn release(&mut self) -> Option<HoldId> {
        let hold = self.active.take()?;
        release_quietly(self.api.as_ref(), &hold.hold_id).await;
        Some(hold.hold_id)
    }

    /// Fire-and-forget release for teardown paths that cannot await
    pub fn release_detached(&mut self) {
        let Some(hold) = self.active.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let api = self.api.clone();
                handle.spawn(async move {
                    release_quietly(api.as_ref(), &hold.hold_id).await;
                });
            }
            Err(_) => debug!(hold_id = %hold.hold_id, "No runtime to release hold; it will lapse"),
        }
    }

    /// Drop the local reference without releasing (a booking consumed it)
    pub fn forget(&mut self) -> Option<Hold> {
        self.active.take()
    }
}

async fn release_quietly(api: &dyn CinemaApi, hold_id: &HoldId) {
    match api.release_hold(hold_id).await {
        Ok(()) => debug!(%hold_id, "Hold released"),
        Err(e) => debug!(%hold_id, "Ignoring hold release failure: {}", e),
    }
}
