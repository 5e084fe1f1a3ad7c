use chrono::{DateTime, Utc};
use reel_core::{remaining_until, Clock};
use reel_shared::HoldId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

/// Fired once when an armed hold's expiry passes
#[derive(Debug, Clone, PartialEq)]
pub struct HoldExpired {
    pub hold_id: HoldId,
}

struct Armed {
    hold_id: HoldId,
    expires_at: DateTime<Utc>,
    task: JoinHandle<()>,
}

/// Client-side timer for the server-issued hold expiry. Remaining time is
/// always `expires_at - now`, recomputed every tick, so suspended tabs and
/// slow ticks never accumulate drift.
pub struct Countdown {
    clock: Arc<dyn Clock>,
    tick: Duration,
    expired_tx: mpsc::UnboundedSender<HoldExpired>,
    remaining_tx: Arc<watch::Sender<Option<Duration>>>,
    armed: Option<Armed>,
}

impl Countdown {
    pub fn new(clock: Arc<dyn Clock>, tick: Duration) -> (Self, mpsc::UnboundedReceiver<HoldExpired>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let (remaining_tx, _) = watch::channel(None);
        let countdown = Self {
            clock,
            tick,
            expired_tx,
            remaining_tx: Arc::new(remaining_tx),
            armed: None,
        };
        (countdown, expired_rx)
    }

    /// Start counting down to `expires_at`. Re-arming replaces the previous
    /// timer, so a new hold gets its own single expiry.
    pub fn arm(&mut self, hold_id: HoldId, expires_at: DateTime<Utc>) {
        self.disarm();

        let task = tokio::spawn(tick_until_expiry(
            self.clock.clone(),
            hold_id.clone(),
            expires_at,
            self.tick,
            self.remaining_tx.clone(),
            self.expired_tx.clone(),
        ));
        self.armed = Some(Armed { hold_id, expires_at, task });
    }

    pub fn disarm(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.task.abort();
        }
        self.remaining_tx.send_replace(None);
    }

    pub fn armed_for(&self) -> Option<&HoldId> {
        self.armed.as_ref().map(|a| &a.hold_id)
    }

    /// Whether this expiry belongs to the hold currently armed. Expiries of
    /// replaced holds may still sit in the channel.
    pub fn is_current(&self, expired: &HoldExpired) -> bool {
        self.armed_for() == Some(&expired.hold_id)
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.armed
            .as_ref()
            .map(|a| remaining_until(a.expires_at, self.clock.now()))
    }

    /// Ticking display value; `None` while nothing is armed
    pub fn watch(&self) -> watch::Receiver<Option<Duration>> {
        self.remaining_tx.subscribe()
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.task.abort();
        }
    }
}

async fn tick_until_expiry(
    clock: Arc<dyn Clock>,
    hold_id: HoldId,
    expires_at: DateTime<Utc>,
    tick: Duration,
    remaining_tx: Arc<watch::Sender<Option<Duration>>>,
    expired_tx: mpsc::UnboundedSender<HoldExpired>,
) {
    loop {
        let remaining = remaining_until(expires_at, clock.now());
        remaining_tx.send_replace(Some(remaining));

        if remaining.is_zero() {
            info!(%hold_id, "Hold expired");
            let _ = expired_tx.send(HoldExpired { hold_id });
            return;
        }

        tokio::time::sleep(tick.min(remaining)).await;
    }
}

/// `MM:SS`, rounding partial seconds up so `00:00` only shows at expiry
pub fn format_remaining(remaining: Duration) -> String {
    let mut secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs += 1;
    }
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
