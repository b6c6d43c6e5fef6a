use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of Unix time for interval decisions.
pub trait Clock {
    fn unix_timestamp(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_timestamp(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// Manually driven clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct FixedClock(Arc<AtomicI64>);

impl FixedClock {
    pub fn new(now: i64) -> Self {
        Self(Arc::new(AtomicI64::new(now)))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn unix_timestamp(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn unix_timestamp(&self) -> i64 {
        (**self).unix_timestamp()
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn unix_timestamp(&self) -> i64 {
        (**self).unix_timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_shared() {
        let a = FixedClock::new(100);
        let b = a.clone();
        a.advance(50);
        assert_eq!(b.unix_timestamp(), 150);
        b.set(7);
        assert_eq!(a.unix_timestamp(), 7);
    }

    #[test]
    fn test_system_clock_after_2020() {
        assert!(SystemClock.unix_timestamp() > 1_577_836_800);
    }
}
