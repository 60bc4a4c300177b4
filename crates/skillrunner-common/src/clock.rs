//! Injectable time source.
//!
//! The clock is read exactly once per phase boundary by the engine so that
//! `expires_at` (cache) and `updated_at` (checkpoint) stay consistent within
//! a single phase. Tests substitute [`FixedClock`] to assert monotonicity
//! and TTL expiry without sleeping.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that returns a fixed instant, advanced explicitly by tests.
#[derive(Debug)]
pub struct FixedClock(std::sync::Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(std::sync::Mutex::new(at))
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.0.lock().expect("fixed clock mutex poisoned");
        *guard += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().expect("fixed clock mutex poisoned")
    }
}

/// Convenience constructor for tests that need an `Arc<dyn Clock>` fixed
/// at a specific instant and advanced explicitly.
pub fn test_clock_at(at: DateTime<Utc>) -> std::sync::Arc<FixedClock> {
    std::sync::Arc::new(FixedClock::new(at))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances_monotonically() {
        let clock = FixedClock::new(Utc::now());
        let t0 = clock.now();
        clock.advance(chrono::Duration::seconds(30));
        let t1 = clock.now();
        assert!(t1 > t0);
    }
}
