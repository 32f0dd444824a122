//! Render job admission.
//!
//! A counting gate over a named in-flight set: at most `max_concurrent`
//! jobs run at once, and the set doubles as the restart gate (no scheduled
//! restart while it is non-empty). Excess callers poll with a bounded
//! sleep-and-retry instead of queueing unboundedly, which caps the memory
//! pressure from simultaneous pages.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::{RenderError, Result};

/// How long a waiting caller sleeps between admission attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct RenderGate {
    max_concurrent: usize,
    in_flight: Mutex<HashSet<String>>,
}

impl RenderGate {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Admit `name`, waiting up to `deadline` for a slot. Job names are
    /// unique while in flight; a second job with the same name waits for
    /// the first to finish.
    pub async fn admit(self: &Arc<Self>, name: &str, deadline: Duration) -> Result<SlotGuard> {
        let started = Instant::now();
        loop {
            if self.try_admit(name) {
                trace!(job = name, in_flight = self.in_flight(), "job admitted");
                return Ok(SlotGuard {
                    gate: self.clone(),
                    name: name.to_string(),
                });
            }
            if started.elapsed() >= deadline {
                return Err(RenderError::Busy(name.to_string()));
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline)).await;
        }
    }

    fn try_admit(&self, name: &str) -> bool {
        let mut set = self.in_flight.lock().expect("in-flight set poisoned");
        if set.len() >= self.max_concurrent || set.contains(name) {
            return false;
        }
        set.insert(name.to_string());
        true
    }

    fn release(&self, name: &str) {
        let mut set = self.in_flight.lock().expect("in-flight set poisoned");
        set.remove(name);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().expect("in-flight set poisoned").len()
    }

    /// Restart gate: scheduled restarts only proceed when nothing is in
    /// flight.
    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

/// Releases the job's slot when dropped, on every exit path.
#[derive(Debug)]
pub struct SlotGuard {
    gate: Arc<RenderGate>,
    name: String,
}

impl SlotGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.gate.release(&self.name);
    }
}
