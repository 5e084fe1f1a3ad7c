use reel_core::mock::{MockCinemaApi, MockConflictFeed};
use reel_core::{ApiError, CinemaApi, Clock, ConflictFeed, SystemClock};
use reel_shared::{PaymentStatusReport, Seat, SeatId, ShowtimeId};
use reel_store::{Config, HttpCinemaApi, SseConflictFeed};
use std::sync::Arc;
use std::time::Duration;

/// Tunables for one booking flow
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSettings {
    pub max_seats: usize,
    pub countdown_tick: Duration,
    pub seat_refresh: Duration,
    pub reconnect_delay: Duration,
    pub payment_poll: Duration,
    pub payment_max_wait: Duration,
}

impl FlowSettings {
    pub fn from_config(config: &Config) -> Self {
        let rules = &config.booking;
        Self {
            max_seats: rules.max_seats,
            countdown_tick: rules.countdown_tick(),
            seat_refresh: rules.seat_refresh(),
            reconnect_delay: Duration::from_secs(config.realtime.reconnect_secs),
            payment_poll: rules.payment_poll(),
            payment_max_wait: rules.payment_max_wait(),
        }
    }
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything a flow talks to, handed over explicitly so each test can
/// build its own
#[derive(Clone)]
pub struct ClientSession {
    pub api: Arc<dyn CinemaApi>,
    pub feed: Option<Arc<dyn ConflictFeed>>,
    pub clock: Arc<dyn Clock>,
    pub settings: FlowSettings,
}

impl ClientSession {
    pub fn new(api: Arc<dyn CinemaApi>, clock: Arc<dyn Clock>) -> Self {
        Self { api, feed: None, clock, settings: FlowSettings::default() }
    }

    pub fn with_feed(mut self, feed: Arc<dyn ConflictFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn with_settings(mut self, settings: FlowSettings) -> Self {
        self.settings = settings;
        self
    }

    /// HTTP client, SSE feed when `realtime.url` is set, wall clock
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let api = Arc::new(HttpCinemaApi::new(&config.api)?);
        let mut session = Self::new(api, Arc::new(SystemClock)).with_settings(FlowSettings::from_config(config));
        if let Some(url) = &config.realtime.url {
            session = session.with_feed(Arc::new(SseConflictFeed::new(url)));
        }
        Ok(session)
    }

    /// In-memory API and conflict feed on the wall clock, for running the
    /// binary without a backend. Seeds a two-row seat map with one seat
    /// already sold, a `DRYRUN10` promo, and a payment that settles on the
    /// second status check.
    pub fn dry_run(config: &Config, showtime_id: &ShowtimeId) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let seats = ["A", "B"]
            .iter()
            .flat_map(|row| (1..=6).map(move |number| Seat::new(format!("{}{}", row, number), row, number)))
            .map(|seat| seat.with_price(DRY_RUN_SEAT_PRICE))
            .collect();
        let api = MockCinemaApi::new(clock.clone())
            .with_seats(showtime_id.clone(), seats)
            .with_promo(DRY_RUN_PROMO, 10_000);
        api.mark_taken(showtime_id, &[SeatId::from("A1")]);
        api.push_payment_status(PaymentStatusReport::pending());
        api.push_payment_status(PaymentStatusReport::success());

        Self::new(Arc::new(api), clock)
            .with_feed(Arc::new(MockConflictFeed::new()))
            .with_settings(FlowSettings::from_config(config))
    }
}

pub const DRY_RUN_PROMO: &str = "DRYRUN10";
const DRY_RUN_SEAT_PRICE: i64 = 90_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_follow_config() {
        let mut config = Config::default();
        config.booking.max_seats = 4;
        config.booking.payment_poll_secs = 1;
        config.realtime.reconnect_secs = 30;

        let settings = FlowSettings::from_config(&config);
        assert_eq!(settings.max_seats, 4);
        assert_eq!(settings.payment_poll, Duration::from_secs(1));
        assert_eq!(settings.reconnect_delay, Duration::from_secs(30));
        assert_eq!(settings.payment_max_wait, Duration::from_secs(300));
    }

    #[test]
    fn test_realtime_is_optional() {
        let mut config = Config::default();
        assert!(ClientSession::from_config(&config).unwrap().feed.is_none());

        config.realtime.url = Some("http://localhost:8081/rt".to_string());
        assert!(ClientSession::from_config(&config).unwrap().feed.is_some());
    }

    #[tokio::test]
    async fn test_dry_run_serves_a_seeded_showtime() {
        let showtime_id = ShowtimeId::from("st-dry");
        let session = ClientSession::dry_run(&Config::default(), &showtime_id);
        assert!(session.feed.is_some());

        let seats = session.api.seats(&showtime_id).await.unwrap();
        assert_eq!(seats.len(), 12);
        assert_eq!(seats.iter().filter(|s| s.status == reel_shared::SeatStatus::Available).count(), 11);
    }
}
