//! Clock abstraction for deterministic testing.
//!
//! Every timing decision in the pipeline (dwell settling, filter reset,
//! deferred focus clear, flow log timestamps) reads milliseconds from a
//! `Clock`. Production code uses `SystemClock`; tests use `TestClock`
//! and advance it by hand.

use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

/// Trait abstracting time sources for testability.
pub trait Clock: Send + Sync {
    /// Monotonic milliseconds since the clock was created.
    fn now_ms(&self) -> i64;

    /// Wall-clock time as milliseconds since UNIX epoch.
    fn unix_millis(&self) -> i64;
}

fn system_unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Production clock using real system time.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        self.origin.elapsed().as_millis() as i64
    }

    fn unix_millis(&self) -> i64 {
        system_unix_millis()
    }
}

/// Test clock with manually controlled time.
pub struct TestClock {
    elapsed_ms: Mutex<i64>,
    unix_ms: Mutex<i64>,
}

impl TestClock {
    /// Create a test clock at monotonic time zero.
    pub fn new() -> Self {
        Self {
            elapsed_ms: Mutex::new(0),
            unix_ms: Mutex::new(system_unix_millis()),
        }
    }

    /// Advance time by the given duration.
    pub fn advance(&self, duration: Duration) {
        let step = duration.as_millis() as i64;
        if let Ok(mut ms) = self.elapsed_ms.lock() {
            *ms += step;
        }
        if let Ok(mut ms) = self.unix_ms.lock() {
            *ms += step;
        }
    }

    /// Advance time by `ms` milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Set the UNIX millisecond timestamp explicitly.
    pub fn set_unix_millis(&self, ms: i64) {
        if let Ok(mut unix) = self.unix_ms.lock() {
            *unix = ms;
        }
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now_ms(&self) -> i64 {
        self.elapsed_ms.lock().map(|ms| *ms).unwrap_or(0)
    }

    fn unix_millis(&self) -> i64 {
        self.unix_ms.lock().map(|ms| *ms).unwrap_or(0)
    }
}
