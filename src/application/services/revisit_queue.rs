//! Revisit queue - deferred reference resolution with a bounded drain
//!
//! Documents created during an import whose payload still carries source ids
//! are pushed here. Once every document of the bundle exists the queue is
//! drained in FIFO order against a wall-clock ceiling; each item's outcome is
//! kept for the import summary.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{timeout, Instant};
use tracing::{info, warn};

use crate::application::services::errors::AdventureError;
use crate::domain::value_objects::DocumentKind;

/// Where a queued document lives in the destination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentAddress {
    World { kind: DocumentKind, id: String },
    Collection { pack_id: String, entry_id: String },
}

impl fmt::Display for DocumentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::World { kind, id } => write!(f, "{}.{}", kind.document_name(), id),
            Self::Collection { pack_id, entry_id } => write!(f, "Compendium.{}.{}", pack_id, entry_id),
        }
    }
}

/// References rewritten and left alone while revisiting one document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionTally {
    pub resolved: usize,
    pub unresolved: usize,
}

impl ResolutionTally {
    pub fn hit(&mut self) {
        self.resolved += 1;
    }

    pub fn miss(&mut self) {
        self.unresolved += 1;
    }

    pub fn status(&self) -> RevisitStatus {
        match (self.resolved, self.unresolved) {
            (_, 0) => RevisitStatus::Resolved,
            (0, _) => RevisitStatus::Unresolved,
            _ => RevisitStatus::PartiallyResolved,
        }
    }
}

impl std::ops::AddAssign for ResolutionTally {
    fn add_assign(&mut self, other: Self) {
        self.resolved += other.resolved;
        self.unresolved += other.unresolved;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RevisitStatus {
    Resolved,
    PartiallyResolved,
    Unresolved,
    Failed { reason: String },
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisitOutcome {
    pub address: DocumentAddress,
    #[serde(flatten)]
    pub status: RevisitStatus,
    pub resolved: usize,
    pub unresolved: usize,
}

/// Per-status counts of a drained queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RevisitCounts {
    pub resolved: usize,
    pub partially_resolved: usize,
    pub unresolved: usize,
    pub failed: usize,
    pub timed_out: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RevisitReport {
    pub outcomes: Vec<RevisitOutcome>,
    pub timed_out: bool,
}

impl RevisitReport {
    pub fn counts(&self) -> RevisitCounts {
        let mut counts = RevisitCounts::default();
        for outcome in &self.outcomes {
            match outcome.status {
                RevisitStatus::Resolved => counts.resolved += 1,
                RevisitStatus::PartiallyResolved => counts.partially_resolved += 1,
                RevisitStatus::Unresolved => counts.unresolved += 1,
                RevisitStatus::Failed { .. } => counts.failed += 1,
                RevisitStatus::TimedOut => counts.timed_out += 1,
            }
        }
        counts
    }
}

/// FIFO worklist of documents awaiting reference resolution
#[derive(Debug, Default)]
pub struct RevisitQueue {
    pending: VecDeque<DocumentAddress>,
    queued: HashSet<DocumentAddress>,
}

impl RevisitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an address; returns false if it was already queued
    pub fn push(&mut self, address: DocumentAddress) -> bool {
        if !self.queued.insert(address.clone()) {
            return false;
        }
        self.pending.push_back(address);
        true
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Resolve queued items in order until the queue is empty or `ceiling` elapses.
    ///
    /// Items still pending when the ceiling hits are recorded as timed out and
    /// left exactly as they were created.
    pub async fn drain<F, Fut>(&mut self, ceiling: Duration, mut resolve: F) -> RevisitReport
    where
        F: FnMut(DocumentAddress) -> Fut,
        Fut: Future<Output = Result<ResolutionTally, AdventureError>>,
    {
        let deadline = Instant::now() + ceiling;
        let mut report = RevisitReport::default();
        info!(pending = self.pending.len(), "Resolving deferred references");

        while let Some(address) = self.pending.pop_front() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.expire(address, ceiling, &mut report);
                break;
            }

            match timeout(remaining, resolve(address.clone())).await {
                Ok(Ok(tally)) => report.outcomes.push(RevisitOutcome {
                    address,
                    status: tally.status(),
                    resolved: tally.resolved,
                    unresolved: tally.unresolved,
                }),
                Ok(Err(e)) => {
                    warn!(document = %address, error = %e, "Failed to resolve references");
                    report.outcomes.push(RevisitOutcome {
                        address,
                        status: RevisitStatus::Failed {
                            reason: e.to_string(),
                        },
                        resolved: 0,
                        unresolved: 0,
                    });
                }
                Err(_) => {
                    self.expire(address, ceiling, &mut report);
                    break;
                }
            }
        }
        self.queued.clear();
        report
    }

    fn expire(&mut self, current: DocumentAddress, ceiling: Duration, report: &mut RevisitReport) {
        report.timed_out = true;
        let left = self.pending.len() + 1;
        warn!(
            error = %AdventureError::RevisitTimeout(ceiling),
            left,
            "Leaving remaining references as authored"
        );
        for address in std::iter::once(current).chain(self.pending.drain(..)) {
            report.outcomes.push(RevisitOutcome {
                address,
                status: RevisitStatus::TimedOut,
                resolved: 0,
                unresolved: 0,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(id: &str) -> DocumentAddress {
        DocumentAddress::World {
            kind: DocumentKind::Scene,
            id: id.to_string(),
        }
    }

    #[test]
    fn test_push_dedupes_and_displays_addresses() {
        let mut queue = RevisitQueue::new();
        assert!(queue.push(scene("s1")));
        assert!(!queue.push(scene("s1")));
        assert_eq!(queue.len(), 1);
        assert_eq!(scene("s1").to_string(), "Scene.s1");
        let entry = DocumentAddress::Collection {
            pack_id: "world.loot".to_string(),
            entry_id: "e1".to_string(),
        };
        assert_eq!(entry.to_string(), "Compendium.world.loot.e1");
    }

    #[tokio::test]
    async fn test_drain_is_fifo_and_records_outcomes() {
        let mut queue = RevisitQueue::new();
        queue.push(scene("s1"));
        queue.push(scene("s2"));
        queue.push(scene("s3"));

        let report = queue
            .drain(Duration::from_secs(60), |address| async move {
                match address.to_string().as_str() {
                    "Scene.s1" => Ok(ResolutionTally { resolved: 2, unresolved: 0 }),
                    "Scene.s2" => Ok(ResolutionTally { resolved: 2, unresolved: 1 }),
                    _ => Err(AdventureError::Store(anyhow::anyhow!("gone"))),
                }
            })
            .await;

        assert!(!report.timed_out);
        assert_eq!(report.outcomes[0].address, scene("s1"));
        assert_eq!(report.outcomes[0].status, RevisitStatus::Resolved);
        assert_eq!(report.outcomes[1].status, RevisitStatus::PartiallyResolved);
        assert!(matches!(report.outcomes[2].status, RevisitStatus::Failed { .. }));
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_stops_at_ceiling_and_marks_the_rest() {
        let mut queue = RevisitQueue::new();
        for id in ["s1", "s2", "s3"] {
            queue.push(scene(id));
        }

        let report = queue
            .drain(Duration::from_secs(60), |_| async {
                tokio::time::sleep(Duration::from_secs(40)).await;
                Ok(ResolutionTally { resolved: 1, unresolved: 0 })
            })
            .await;

        assert!(report.timed_out);
        let counts = report.counts();
        assert_eq!(counts.resolved, 1);
        assert_eq!(counts.timed_out, 2);
        assert!(queue.is_empty());
    }
}
