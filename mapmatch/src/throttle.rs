use std::time::Duration;

/// The free plan allows at most this many requests per second.
pub const FREE_PLAN_MAX_REQUESTS_PER_SECOND: u32 = 5;
/// 1/5 s would be exactly at the limit, so leave a little margin.
pub const DELAY_BETWEEN_BATCHES: Duration = Duration::from_millis(250);

/// A fixed delay between the starts of consecutive requests. The first call never waits. This
/// doesn't account for how long a request took, so it's only a lower bound on the spacing.
pub struct Throttle {
    interval: Duration,
    started: bool,
}

impl Throttle {
    pub fn new(interval: Duration) -> Throttle {
        Throttle {
            interval,
            started: false,
        }
    }

    /// Blocks until the next request may start. Returns how long it slept, or `None` for the very
    /// first request.
    pub fn wait(&mut self) -> Option<Duration> {
        if !self.started {
            self.started = true;
            return None;
        }
        if !self.interval.is_zero() {
            std::thread::sleep(self.interval);
        }
        Some(self.interval)
    }
}
