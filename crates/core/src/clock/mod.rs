use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

/// Time source consulted by the track scheduler. The scheduler never reads
/// the wall clock itself.
pub trait Clock {
    /// Time elapsed since the clock was created.
    fn now(&self) -> Duration;

    /// Time elapsed since the previous call to `delta` (or since creation on
    /// the first call).
    fn delta(&mut self) -> Duration;
}

/// Monotonic clock backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
    last: Instant,
}

impl SystemClock {
    pub fn start() -> Self {
        let now = Instant::now();
        Self {
            origin: now,
            last: now,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::start()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn delta(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now.duration_since(self.last);
        self.last = now;
        delta
    }
}

#[derive(Debug, Default)]
struct ManualState {
    time: Duration,
    last_delta_at: Duration,
}

/// Clock that only moves when told to. Clones share the same timeline, so a
/// test can keep a handle while the scheduler owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, delta: Duration) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.time += delta;
    }

    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = ManualState::default();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .time
    }

    fn delta(&mut self) -> Duration {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let delta = state.time - state.last_delta_at;
        state.last_delta_at = state.time;
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_reports_delta_since_last_call() {
        let mut clock = ManualClock::new();
        let handle = clock.clone();

        handle.advance(Duration::from_secs(2));
        assert_eq!(clock.delta(), Duration::from_secs(2));
        assert_eq!(clock.delta(), Duration::ZERO);

        handle.advance(Duration::from_millis(500));
        handle.advance(Duration::from_millis(500));
        assert_eq!(clock.delta(), Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_secs(3));
    }

    #[test]
    fn reset_rewinds_shared_timeline() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_secs(10));
        clock.clone().reset();
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn system_clock_moves_forward() {
        let mut clock = SystemClock::start();
        let first = clock.now();
        let _ = clock.delta();
        assert!(clock.now() >= first);
    }
}
