use futures_util::StreamExt;
use reel_catalog::SeatSelection;
use reel_core::ConflictFeed;
use reel_shared::{SeatConflictEvent, SeatId, ShowtimeId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A seat-taken report from either source
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictSignal {
    /// 409 on our own hold request
    HoldRejected { seat_ids: Vec<SeatId> },
    /// Pushed by the realtime channel
    Realtime(SeatConflictEvent),
}

/// Producer side. Cheap to clone; one per source.
#[derive(Debug, Clone)]
pub struct ConflictSender {
    tx: mpsc::UnboundedSender<ConflictSignal>,
}

impl ConflictSender {
    /// False once the reconciler is gone
    pub fn send(&self, signal: ConflictSignal) -> bool {
        self.tx.send(signal).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Merges every conflict source into the selection's conflicted set
pub struct ConflictReconciler {
    showtime_id: ShowtimeId,
    rx: mpsc::UnboundedReceiver<ConflictSignal>,
}

pub fn conflict_channel(showtime_id: ShowtimeId) -> (ConflictSender, ConflictReconciler) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ConflictSender { tx }, ConflictReconciler { showtime_id, rx })
}

impl ConflictReconciler {
    /// Apply one signal; returns the seat ids that were marked conflicted.
    /// Realtime reports only count for seats the shopper has selected.
    pub fn apply(&self, signal: ConflictSignal, selection: &mut SeatSelection) -> Vec<SeatId> {
        let seat_ids = match signal {
            ConflictSignal::HoldRejected { seat_ids } => seat_ids,
            ConflictSignal::Realtime(event) => {
                if event.showtime_id != self.showtime_id {
                    return Vec::new();
                }
                event.seat_ids.into_iter().filter(|id| selection.contains(id)).collect()
            }
        };

        if !seat_ids.is_empty() {
            selection.mark_conflicted(&seat_ids);
        }
        seat_ids
    }

    /// Apply everything queued so far without waiting
    pub fn drain(&mut self, selection: &mut SeatSelection) -> Vec<SeatId> {
        let mut applied = Vec::new();
        while let Ok(signal) = self.rx.try_recv() {
            applied.extend(self.apply(signal, selection));
        }
        applied
    }

    /// Wait for the next signal. `None` when every sender is dropped.
    pub async fn recv(&mut self) -> Option<ConflictSignal> {
        self.rx.recv().await
    }
}

/// Aborts the forwarder when dropped
pub struct RealtimeHandle {
    task: JoinHandle<()>,
}

impl Drop for RealtimeHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Pipe the realtime feed into the reconciler. Best-effort: connection
/// failures are logged and retried after `reconnect_delay`, never surfaced.
pub fn spawn_realtime_forwarder(
    feed: Arc<dyn ConflictFeed>,
    showtime_id: ShowtimeId,
    sender: ConflictSender,
    reconnect_delay: Duration,
) -> RealtimeHandle {
    let task = tokio::spawn(async move {
        while !sender.is_closed() {
            match feed.subscribe(&showtime_id).await {
                Ok(mut stream) => {
                    debug!(%showtime_id, "Realtime conflicts connected");
                    while let Some(event) = stream.next().await {
                        warn!(%showtime_id, seats = ?event.seat_ids, "Realtime seat conflict");
                        if !sender.send(ConflictSignal::Realtime(event)) {
                            return;
                        }
                    }
                    debug!(%showtime_id, "Realtime conflict stream ended");
                }
                Err(e) => debug!(%showtime_id, "Realtime conflicts unavailable: {}", e),
            }
            tokio::time::sleep(reconnect_delay).await;
        }
    });

    RealtimeHandle { task }
}
