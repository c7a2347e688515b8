//! Time source.

use chrono::{DateTime, Utc};

/// Port for getting the current time.
pub trait Clock: Send + Sync {
    /// Current instant, UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// System clock using the OS time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen on a given instant, movable by hand.
#[cfg(test)]
#[derive(Debug)]
pub struct FixedClock {
    micros: std::sync::atomic::AtomicI64,
}

#[cfg(test)]
impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            micros: std::sync::atomic::AtomicI64::new(now.timestamp_micros()),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.micros.store(
            now.timestamp_micros(),
            std::sync::atomic::Ordering::SeqCst,
        );
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(
            self.micros.load(std::sync::atomic::Ordering::SeqCst),
        )
        .expect("timestamp out of range")
    }
}
