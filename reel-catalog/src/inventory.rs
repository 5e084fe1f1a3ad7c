use reel_core::{ApiError, ApiResult, CinemaApi, Poller};
use reel_shared::{Seat, SeatId, ShowtimeId};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What the seat map renders from
#[derive(Debug, Clone, PartialEq)]
pub enum InventoryState {
    Loading,
    Ready(Vec<Seat>),
    /// Nothing to show; the page offers a retry
    Failed(String),
}

impl InventoryState {
    pub fn seats(&self) -> &[Seat] {
        match self {
            InventoryState::Ready(seats) => seats,
            InventoryState::Loading | InventoryState::Failed(_) => &[],
        }
    }
}

/// Read-only view of a showtime's seats. The server owns the truth; this
/// only fetches and republishes it.
pub struct InventoryView {
    api: Arc<dyn CinemaApi>,
    showtime_id: ShowtimeId,
    tx: Arc<watch::Sender<InventoryState>>,
    rx: watch::Receiver<InventoryState>,
}

impl InventoryView {
    pub fn new(api: Arc<dyn CinemaApi>, showtime_id: ShowtimeId) -> Self {
        let (tx, rx) = watch::channel(InventoryState::Loading);
        Self { api, showtime_id, tx: Arc::new(tx), rx }
    }

    /// Create the view and load it once
    pub async fn open(api: Arc<dyn CinemaApi>, showtime_id: ShowtimeId) -> Result<Self, ApiError> {
        let view = Self::new(api, showtime_id);
        view.refresh().await?;
        Ok(view)
    }

    pub async fn refresh(&self) -> ApiResult<()> {
        fetch_into(self.api.as_ref(), &self.showtime_id, &self.tx).await
    }

    pub fn showtime_id(&self) -> &ShowtimeId {
        &self.showtime_id
    }

    pub fn state(&self) -> InventoryState {
        self.rx.borrow().clone()
    }

    pub fn seat(&self, seat_id: &SeatId) -> Option<Seat> {
        self.rx.borrow().seats().iter().find(|s| &s.id == seat_id).cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<InventoryState> {
        self.rx.clone()
    }

    /// Refetch every `interval` so other shoppers' activity shows up.
    /// Stops when the handle is dropped or nobody watches any more.
    pub fn spawn_refresh(&self, interval: Duration) -> RefreshHandle {
        let api = self.api.clone();
        let showtime_id = self.showtime_id.clone();
        let tx = self.tx.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let poller = Poller::new(interval);
            let _ = poller
                .run(
                    || {
                        let api = api.clone();
                        let showtime_id = showtime_id.clone();
                        let tx = tx.clone();
                        async move {
                            // failures already land in the published state
                            let _ = fetch_into(api.as_ref(), &showtime_id, &tx).await;
                            Ok::<_, Infallible>(tx.is_closed())
                        }
                    },
                    |closed| *closed,
                )
                .await;
            debug!(%showtime_id, "Seat refresh stopped");
        });

        RefreshHandle { task }
    }
}

/// Aborts the background refresh when dropped
pub struct RefreshHandle {
    task: JoinHandle<()>,
}

impl RefreshHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A failed refetch keeps the last good seat list; it only becomes
/// `Failed` when there is nothing to show yet.
async fn fetch_into(
    api: &dyn CinemaApi,
    showtime_id: &ShowtimeId,
    tx: &watch::Sender<InventoryState>,
) -> ApiResult<()> {
    match api.seats(showtime_id).await {
        Ok(seats) => {
            tx.send_replace(InventoryState::Ready(seats));
            Ok(())
        }
        Err(e) => {
            warn!(%showtime_id, "Failed to load seats: {}", e);
            tx.send_if_modified(|state| match state {
                InventoryState::Ready(_) => false,
                _ => {
                    *state = InventoryState::Failed(e.user_message());
                    true
                }
            });
            Err(e)
        }
    }
}
