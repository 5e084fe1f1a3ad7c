use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    /// The stop predicate accepted this value
    Finished(T),
    /// `max_wait` elapsed first; carries the last value seen
    TimedOut { last: Option<T> },
}

/// Fixed-interval poller. The stopping rule is a plain predicate over the
/// fetched value so it can be tested on its own.
#[derive(Debug, Clone)]
pub struct Poller {
    interval: Duration,
    max_wait: Option<Duration>,
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self { interval, max_wait: None }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Fetch immediately, then once per interval, until `stop_when` accepts
    /// a value or `max_wait` runs out. No fetch is issued after the
    /// accepted one. A fetch error ends polling.
    pub async fn run<T, E, F, Fut, S>(&self, mut fetch: F, stop_when: S) -> Result<PollOutcome<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        S: Fn(&T) -> bool,
    {
        let deadline = self.max_wait.map(|wait| Instant::now() + wait);
        let mut attempts: u32 = 0;

        loop {
            let value = fetch().await?;
            attempts += 1;

            if stop_when(&value) {
                debug!(attempts, "Poll finished");
                return Ok(PollOutcome::Finished(value));
            }

            sleep(self.interval).await;

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    debug!(attempts, "Poll timed out");
                    return Ok(PollOutcome::TimedOut { last: Some(value) });
                }
            }
        }
    }
}
