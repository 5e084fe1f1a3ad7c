pub mod app_config;
pub mod http_client;
pub mod realtime;

pub use app_config::Config;
pub use http_client::HttpCinemaApi;
pub use realtime::SseConflictFeed;
