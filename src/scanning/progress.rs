//! Progress reporting for batch queries

use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

use tracing::info;

use crate::common::format_number;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Querying,
    Completed,
    Cancelled,
}

impl Display for BatchPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchPhase::Querying => write!(f, "Querying"),
            BatchPhase::Completed => write!(f, "Completed"),
            BatchPhase::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub total: usize,
    /// Items finished, successfully or not
    pub completed: usize,
    pub failed: usize,
    pub start_time: Instant,
    pub phase: BatchPhase,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
            start_time: Instant::now(),
            phase: BatchPhase::Querying,
        }
    }

    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed as f64 / self.total as f64 * 100.0
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Linear estimate of the time left
    pub fn eta(&self) -> Option<Duration> {
        if self.completed == 0 || self.completed >= self.total {
            return None;
        }
        let per_item = self.elapsed() / self.completed as u32;
        Some(per_item * (self.total - self.completed) as u32)
    }
}

pub trait BatchProgressCallback: Send + Sync {
    fn on_progress(&self, progress: &BatchProgress);
}

impl<F> BatchProgressCallback for F
where
    F: Fn(&BatchProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &BatchProgress) {
        self(progress)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl BatchProgressCallback for NoProgress {
    fn on_progress(&self, _progress: &BatchProgress) {}
}

/// Logs every `every` completed items and at the end
#[derive(Debug, Clone, Copy)]
pub struct LoggingProgress {
    pub every: usize,
}

impl Default for LoggingProgress {
    fn default() -> Self {
        Self { every: 10 }
    }
}

impl BatchProgressCallback for LoggingProgress {
    fn on_progress(&self, progress: &BatchProgress) {
        let step = self.every.max(1);
        if progress.phase == BatchPhase::Querying && progress.completed % step != 0 {
            return;
        }
        info!(
            phase = %progress.phase,
            failed = progress.failed,
            "{} / {} addresses ({:.1}%)",
            format_number(progress.completed as u64),
            format_number(progress.total as u64),
            progress.percentage()
        );
    }
}
