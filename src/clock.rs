//! Injectable clock (spec.md §6), so retry backoff is deterministic and
//! test-observable instead of calling `tokio::time` directly.
//!
//! Grounded on the teacher's dependency-injection pairing of a trait with a
//! production and a mock implementation (`LlmClient`/`MockLlm`,
//! `Checkpointer`/in-memory saver).

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[async_trait]
pub trait Clock: Send + Sync {
    fn now_ns(&self) -> u64;
    async fn sleep(&self, ns: u64);
}

/// Wall-clock implementation backed by `tokio::time::sleep`.
#[derive(Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_ns(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_nanos() as u64
    }

    async fn sleep(&self, ns: u64) {
        tokio::time::sleep(Duration::from_nanos(ns)).await;
    }
}

/// Test clock: `sleep` never actually waits, but every call is recorded so
/// retry timing can be asserted (P12: "sleep is called exactly N-1 times
/// with monotone non-decreasing durations").
#[derive(Debug, Default)]
pub struct ManualClock {
    recorded_sleeps: Mutex<Vec<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded_sleeps(&self) -> Vec<u64> {
        self.recorded_sleeps.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        0
    }

    async fn sleep(&self, ns: u64) {
        self.recorded_sleeps.lock().expect("lock poisoned").push(ns);
    }
}
