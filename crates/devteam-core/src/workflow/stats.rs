//! Per-run metrics aggregation.
//!
//! `StatsTracker` owns the `WorkflowStats` of the current run. Counters only
//! grow during a run; the run is finalized (end time and duration stamped)
//! exactly once, when the run loop exits. Readers get cloned snapshots.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use devteam_types::workflow::{AgentResult, WorkflowStats};

#[derive(Debug, Default)]
pub struct StatsTracker {
    inner: Mutex<Option<WorkflowStats>>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start fresh stats for a new run, discarding any previous run's.
    pub fn begin(&self) {
        *self.lock() = Some(WorkflowStats::new());
    }

    /// Replace the tracked stats with a persisted snapshot.
    pub fn restore(&self, stats: Option<WorkflowStats>) {
        *self.lock() = stats;
    }

    /// Record one executor invocation.
    pub fn record_execution(&self, agent: &str, result: &AgentResult, duration_ms: u64) {
        self.update(|stats| {
            let tokens = result.tokens_used.unwrap_or(0);
            let entry = stats.agent_stats.entry(agent.to_string()).or_default();
            entry.execution_count += 1;
            entry.total_duration_ms += duration_ms;
            entry.total_tokens += tokens;
            stats.total_tokens_used += tokens;

            if result.success {
                entry.success_count += 1;
                stats.files_created += result.files_created.len() as u64;
                stats.files_modified += result.files_modified.len() as u64;
            } else {
                entry.error_count += 1;
                stats.errors_encountered += 1;
            }
        });
    }

    /// Record a failure that happened outside an executor call.
    pub fn record_error(&self) {
        self.update(|stats| stats.errors_encountered += 1);
    }

    pub fn record_checkpoint(&self) {
        self.update(|stats| stats.checkpoints_created += 1);
    }

    /// Stamp end time and duration. Only the first call per run has effect.
    pub fn finalize(&self) {
        self.update(|stats| {
            if stats.ended_at.is_some() {
                return;
            }
            let ended_at = Utc::now();
            stats.duration_ms = (ended_at - stats.started_at)
                .num_milliseconds()
                .max(0) as u64;
            stats.ended_at = Some(ended_at);
        });
    }

    pub fn snapshot(&self) -> Option<WorkflowStats> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().take();
    }

    fn update(&self, f: impl FnOnce(&mut WorkflowStats)) {
        if let Some(stats) = self.lock().as_mut() {
            f(stats);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<WorkflowStats>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_nothing_before_begin() {
        let tracker = StatsTracker::new();
        tracker.record_checkpoint();
        tracker.record_error();
        assert!(tracker.snapshot().is_none());
    }

    #[test]
    fn record_execution_accumulates_per_agent() {
        let tracker = StatsTracker::new();
        tracker.begin();

        let ok = AgentResult::success("planned")
            .with_files_created(["a.md", "b.md"])
            .with_files_modified(["c.md"])
            .with_tokens(120);
        tracker.record_execution("planner", &ok, 40);
        tracker.record_execution("planner", &AgentResult::failure("boom").with_tokens(5), 10);

        let stats = tracker.snapshot().unwrap();
        let planner = &stats.agent_stats["planner"];
        assert_eq!(planner.execution_count, 2);
        assert_eq!(planner.success_count, 1);
        assert_eq!(planner.error_count, 1);
        assert_eq!(planner.total_tokens, 125);
        assert_eq!(planner.total_duration_ms, 50);
        assert_eq!(stats.total_tokens_used, 125);
        assert_eq!(stats.files_created, 2);
        assert_eq!(stats.files_modified, 1);
        assert_eq!(stats.errors_encountered, 1);
    }

    #[test]
    fn finalize_stamps_once() {
        let tracker = StatsTracker::new();
        tracker.begin();
        tracker.finalize();
        let first = tracker.snapshot().unwrap().ended_at.unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        tracker.finalize();
        let second = tracker.snapshot().unwrap().ended_at.unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn begin_discards_previous_run() {
        let tracker = StatsTracker::new();
        tracker.begin();
        tracker.record_checkpoint();
        tracker.finalize();

        tracker.begin();
        let stats = tracker.snapshot().unwrap();
        assert_eq!(stats.checkpoints_created, 0);
        assert!(!stats.is_finalized());

        tracker.clear();
        assert!(tracker.snapshot().is_none());
    }
}
