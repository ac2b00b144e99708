//! Sleep utilities

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use super::shutdown::Shutdown;

/// Something that can pause the current thread.
///
/// Poll pacing and retry delays go through this so tests can run the loops
/// without real time passing.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Real sleeper that wakes early once shutdown is requested.
#[derive(Debug, Clone, Default)]
pub struct ThreadSleeper {
    shutdown: Shutdown,
}

impl ThreadSleeper {
    const SLICE: Duration = Duration::from_millis(200);

    pub fn new(shutdown: Shutdown) -> Self {
        Self { shutdown }
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.shutdown.is_triggered() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(remaining.min(Self::SLICE));
        }
    }
}

/// Sleeper that only records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.recorded().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sleeper() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_secs(1));
        sleeper.sleep(Duration::from_secs(30));
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_secs(1), Duration::from_secs(30)]
        );
        assert_eq!(sleeper.total(), Duration::from_secs(31));
    }

    #[test]
    fn test_thread_sleeper_returns_immediately_after_shutdown() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let sleeper = ThreadSleeper::new(shutdown);

        let started = Instant::now();
        sleeper.sleep(Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
