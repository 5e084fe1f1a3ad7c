use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub booking: BookingRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { base_url: default_base_url(), timeout_ms: default_timeout_ms() }
    }
}

/// Realtime conflict channel. No `url` means the flow relies on hold
/// responses alone.
#[derive(Debug, Deserialize, Clone)]
pub struct RealtimeConfig {
    pub url: Option<String>,
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self { url: None, reconnect_secs: default_reconnect_secs() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    #[serde(default = "default_max_seats")]
    pub max_seats: usize,
    #[serde(default = "default_countdown_tick_ms")]
    pub countdown_tick_ms: u64,
    #[serde(default = "default_seat_refresh_secs")]
    pub seat_refresh_secs: u64,
    #[serde(default = "default_payment_poll_secs")]
    pub payment_poll_secs: u64,
    #[serde(default = "default_payment_max_wait_secs")]
    pub payment_max_wait_secs: u64,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            max_seats: default_max_seats(),
            countdown_tick_ms: default_countdown_tick_ms(),
            seat_refresh_secs: default_seat_refresh_secs(),
            payment_poll_secs: default_payment_poll_secs(),
            payment_max_wait_secs: default_payment_max_wait_secs(),
        }
    }
}

impl BookingRules {
    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }

    pub fn seat_refresh(&self) -> Duration {
        Duration::from_secs(self.seat_refresh_secs)
    }

    pub fn payment_poll(&self) -> Duration {
        Duration::from_secs(self.payment_poll_secs)
    }

    pub fn payment_max_wait(&self) -> Duration {
        Duration::from_secs(self.payment_max_wait_secs)
    }
}

fn default_base_url() -> String { "http://localhost:8080/api".to_string() }
fn default_timeout_ms() -> u64 { 10_000 }
fn default_reconnect_secs() -> u64 { 5 }
fn default_max_seats() -> usize { 8 }
fn default_countdown_tick_ms() -> u64 { 1_000 }
fn default_seat_refresh_secs() -> u64 { 15 }
fn default_payment_poll_secs() -> u64 { 3 }
fn default_payment_max_wait_secs() -> u64 { 300 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            // Per-environment overrides, e.g. config/staging.toml
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `REEL__API__BASE_URL=https://...`
            .add_source(config::Environment::with_prefix("REEL").separator("__"))
            .build()?;

        let cfg: Self = s.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Intervals drive timers and poll loops; zero would spin them.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let intervals = [
            ("booking.countdown_tick_ms", self.booking.countdown_tick_ms),
            ("booking.seat_refresh_secs", self.booking.seat_refresh_secs),
            ("booking.payment_poll_secs", self.booking.payment_poll_secs),
            ("realtime.reconnect_secs", self.realtime.reconnect_secs),
        ];
        if let Some((key, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(config::ConfigError::Message(format!("{} must be greater than zero", key)));
        }
        if self.booking.max_seats == 0 {
            return Err(config::ConfigError::Message("booking.max_seats must be at least 1".to_string()));
        }
        Ok(())
    }
}
