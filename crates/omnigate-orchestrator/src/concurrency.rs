use crate::config::ConcurrencyConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Soft admission control for task dispatch.
///
/// The coordinator reads [`available`](Self::available) before sizing a batch;
/// the autonomous loop moves the ceiling with [`adjust`](Self::adjust).
/// Nothing here blocks: a ceiling below the current in-flight count only
/// stops new admissions.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    ceiling: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    min: usize,
    max: usize,
    step: usize,
}

/// Direction of the last ceiling adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Increased,
    Decreased,
    Unchanged,
}

impl ConcurrencyLimiter {
    pub fn new(config: &ConcurrencyConfig) -> Self {
        let min = config.min.max(1);
        let max = config.max.max(min);
        Self {
            ceiling: AtomicUsize::new(config.initial.clamp(min, max)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            min,
            max,
            step: config.step.max(1),
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Free slots under the current ceiling.
    pub fn available(&self) -> usize {
        self.ceiling().saturating_sub(self.in_flight())
    }

    /// Counts one dispatched task until the guard is dropped.
    pub fn acquire(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Moves the ceiling one step toward the load implied by `queue_depth`.
    ///
    /// Grows when the backlog alone could fill the ceiling, shrinks when
    /// backlog plus in-flight work uses less than half of it. Always stays
    /// within `[min, max]`.
    pub fn adjust(&self, queue_depth: usize) -> Adjustment {
        let ceiling = self.ceiling();
        let in_flight = self.in_flight();

        let next = if queue_depth >= ceiling && ceiling < self.max {
            (ceiling + self.step).min(self.max)
        } else if queue_depth + in_flight < ceiling / 2 && ceiling > self.min {
            ceiling.saturating_sub(self.step).max(self.min)
        } else {
            ceiling
        };

        // lost race with another adjuster: leave their value in place
        if self
            .ceiling
            .compare_exchange(ceiling, next, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Adjustment::Unchanged;
        }
        match next.cmp(&ceiling) {
            std::cmp::Ordering::Greater => Adjustment::Increased,
            std::cmp::Ordering::Less => Adjustment::Decreased,
            std::cmp::Ordering::Equal => Adjustment::Unchanged,
        }
    }
}

/// Releases one in-flight slot on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
