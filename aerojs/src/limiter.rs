// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! Execution resource limits: a wall-clock budget checked at safepoints and
//! a heap byte budget checked at allocation sites.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::{ExecutionError, Result};

/// Embedder-configured caps.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionLimits {
    /// Wall-clock budget for a synchronous turn.
    ///
    /// DEFAULT: unlimited
    pub time_limit: Option<Duration>,

    /// Upper bound on live heap bytes plus in-flight allocations.
    ///
    /// DEFAULT: unlimited
    pub memory_limit: Option<usize>,
}

/// Tracks consumption against [`ExecutionLimits`].
///
/// The aborting flag is sticky: once the time budget expires, every
/// subsequent checkpoint fails until the embedder re-arms the limit,
/// unwinding the current turn.
#[derive(Debug)]
pub struct LimitTracker {
    time_limit: Option<Duration>,
    started: Option<minstant::Instant>,
    memory_limit: Option<usize>,
    heap_usage: usize,
    aborting: AtomicBool,
}

impl LimitTracker {
    pub fn new(limits: ExecutionLimits) -> Self {
        LimitTracker {
            time_limit: limits.time_limit,
            started: limits.time_limit.map(|_| minstant::Instant::now()),
            memory_limit: limits.memory_limit,
            heap_usage: 0,
            aborting: AtomicBool::new(false),
        }
    }

    /// Arm (or re-arm) the execution-time limit, clearing a pending abort.
    pub fn arm_time_limit(&mut self, limit: Duration) {
        self.time_limit = Some(limit);
        self.started = Some(minstant::Instant::now());
        self.aborting.store(false, Ordering::Release);
    }

    pub fn disarm_time_limit(&mut self) {
        self.time_limit = None;
        self.started = None;
        self.aborting.store(false, Ordering::Release);
    }

    pub fn set_memory_limit(&mut self, limit: Option<usize>) {
        self.memory_limit = limit;
    }

    /// Request an abort from another thread; honored at the next safepoint.
    pub fn abort(&self) {
        self.aborting.store(true, Ordering::Release);
    }

    pub fn is_aborting(&self) -> bool {
        self.aborting.load(Ordering::Acquire)
    }

    /// Safepoint poll. Fails once the turn is out of time.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_aborting() {
            return Err(ExecutionError::Aborted);
        }
        if let (Some(limit), Some(started)) = (self.time_limit, self.started) {
            if started.elapsed() > limit {
                self.aborting.store(true, Ordering::Release);
                log::debug!("execution time limit of {limit:?} expired");
                return Err(ExecutionError::Aborted);
            }
        }
        Ok(())
    }

    /// Account for an allocation of `bytes`. Checked, never wraps.
    pub fn charge_allocation(&mut self, bytes: usize) -> Result<()> {
        let next = self
            .heap_usage
            .checked_add(bytes)
            .ok_or(ExecutionError::OutOfMemory)?;
        if let Some(limit) = self.memory_limit {
            if next > limit {
                log::debug!("memory limit hit: {next} > {limit}");
                return Err(ExecutionError::OutOfMemory);
            }
        }
        self.heap_usage = next;
        Ok(())
    }

    /// Resynchronize with the heap after a collection.
    pub fn set_heap_usage(&mut self, bytes: usize) {
        self.heap_usage = bytes;
    }

    pub fn heap_usage(&self) -> usize {
        self.heap_usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_tracker_never_trips() {
        let mut t = LimitTracker::new(ExecutionLimits::default());
        t.checkpoint().unwrap();
        t.charge_allocation(usize::MAX / 2).unwrap();
        t.checkpoint().unwrap();
    }

    #[test]
    fn memory_limit_is_enforced() {
        let mut t = LimitTracker::new(ExecutionLimits {
            memory_limit: Some(100),
            ..Default::default()
        });
        t.charge_allocation(60).unwrap();
        assert!(matches!(
            t.charge_allocation(60),
            Err(ExecutionError::OutOfMemory)
        ));
        // A collection shrinking usage unblocks allocation.
        t.set_heap_usage(10);
        t.charge_allocation(60).unwrap();
    }

    #[test]
    fn abort_is_sticky_until_rearmed() {
        let mut t = LimitTracker::new(ExecutionLimits::default());
        t.abort();
        assert!(matches!(t.checkpoint(), Err(ExecutionError::Aborted)));
        assert!(matches!(t.checkpoint(), Err(ExecutionError::Aborted)));
        t.arm_time_limit(Duration::from_secs(60));
        t.checkpoint().unwrap();
    }

    #[test]
    fn expired_deadline_aborts() {
        let mut t = LimitTracker::new(ExecutionLimits::default());
        t.arm_time_limit(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(t.checkpoint(), Err(ExecutionError::Aborted)));
        assert!(t.is_aborting());
    }
}
