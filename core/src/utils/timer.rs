//! Timing utilities
//!
//! A small wall-clock timer used to measure warehouse round-trips and flag slow queries.

use log::{debug, warn};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::{Duration, Instant};

/// Default threshold above which a query is reported as slow
pub const SLOW_QUERY_THRESHOLD: Duration = Duration::from_secs(10);

/// Timer for measuring execution time
#[derive(Debug, Clone)]
pub struct Timer {
    /// Name of the timer
    name: String,

    /// Start time
    start: Instant,

    /// Elapsed time above which `log` reports at warn level
    slow_threshold: Option<Duration>,

    /// Whether to log automatically on drop
    log_on_drop: bool,
}

impl Timer {
    /// Create a new timer with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Timer {
            name: name.into(),
            start: Instant::now(),
            slow_threshold: None,
            log_on_drop: true,
        }
    }

    /// Timer preconfigured for a warehouse query
    pub fn for_query(name: impl Into<String>) -> Self {
        Timer::new(name).with_slow_threshold(SLOW_QUERY_THRESHOLD)
    }

    /// Set the slow threshold for the timer
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }

    /// Disable automatic logging on drop
    pub fn without_auto_log(mut self) -> Self {
        self.log_on_drop = false;
        self
    }

    /// Get the elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Check if the timer has exceeded the slow threshold
    pub fn is_slow(&self) -> bool {
        self.exceeds(self.elapsed())
    }

    fn exceeds(&self, elapsed: Duration) -> bool {
        matches!(self.slow_threshold, Some(threshold) if elapsed > threshold)
    }

    /// Stop the timer, log once, and return the elapsed time
    pub fn finish(mut self, message: impl Into<String>) -> Duration {
        let elapsed = self.elapsed();
        self.log(message);
        self.log_on_drop = false;
        elapsed
    }

    /// Log the elapsed time at a level based on the slow threshold
    pub fn log(&self, message: impl Into<String>) {
        let elapsed = self.elapsed();
        let msg = format!("{} {}: {:.2}s", self.name, message.into(), elapsed.as_secs_f64());

        if self.exceeds(elapsed) {
            warn!("{} [SLOW]", msg);
        } else {
            debug!("{}", msg);
        }
    }
}

impl Display for Timer {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}: {:?}", self.name, self.elapsed())
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if self.log_on_drop {
            self.log("completed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_timer_basic() {
        let timer = Timer::new("test_timer").without_auto_log();
        thread::sleep(Duration::from_millis(10));

        assert!(timer.elapsed() >= Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10);
    }

    #[test]
    fn test_slow_threshold() {
        let timer = Timer::new("test_timer")
            .with_slow_threshold(Duration::from_millis(5))
            .without_auto_log();
        assert!(!timer.is_slow());

        thread::sleep(Duration::from_millis(10));
        assert!(timer.is_slow());
    }

    #[test]
    fn test_no_threshold_is_never_slow() {
        let timer = Timer::new("test_timer").without_auto_log();
        thread::sleep(Duration::from_millis(2));
        assert!(!timer.is_slow());
    }

    #[test]
    fn test_finish_returns_elapsed() {
        let timer = Timer::for_query("query");
        thread::sleep(Duration::from_millis(5));
        assert!(timer.finish("executed") >= Duration::from_millis(5));
    }
}
