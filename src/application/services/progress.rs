//! Progress reporting for long-running export and import operations
//!
//! The total grows while work is discovered (nested assets), so observers
//! should treat it as a moving target. `processed` only ever increases.

use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

impl Progress {
    /// Completed share in whole percent, capped at 100
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.processed.min(self.total) * 100) / self.total) as u8
    }
}

/// Shared progress counter with watch-channel observers
#[derive(Debug)]
pub struct ProgressTracker {
    sender: watch::Sender<Progress>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Progress::default());
        Self { sender }
    }

    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.sender.subscribe()
    }

    /// Grow the total by `units` of newly discovered work
    pub fn add_work(&self, units: usize) {
        if units > 0 {
            self.sender.send_modify(|progress| progress.total += units);
        }
    }

    /// Mark one unit of work as done
    pub fn advance(&self) {
        self.sender.send_modify(|progress| progress.processed += 1);
    }

    pub fn snapshot(&self) -> Progress {
        *self.sender.borrow()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
