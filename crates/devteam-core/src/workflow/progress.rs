//! Progress computation and rendering.

use chrono::Utc;
use devteam_types::workflow::{ProgressInfo, WorkflowContext, WorkflowStats};

const DEFAULT_BAR_WIDTH: usize = 20;

/// Computes progress for a run and renders it as text.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    bar_width: usize,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            bar_width: DEFAULT_BAR_WIDTH,
        }
    }

    /// Progress of `ctx`, with file counts taken from `stats` when present.
    ///
    /// The ETA is `elapsed / steps_done * steps_remaining`; it is `None` until
    /// a step has completed.
    pub fn compute(&self, ctx: &WorkflowContext, stats: Option<&WorkflowStats>) -> ProgressInfo {
        let elapsed_ms = (Utc::now() - ctx.started_at).num_milliseconds().max(0) as u64;
        let remaining_steps = ctx.total_steps.saturating_sub(ctx.current_step);

        let estimated_remaining_ms = (ctx.current_step > 0)
            .then(|| elapsed_ms / u64::from(ctx.current_step) * u64::from(remaining_steps));

        let files_processed = stats.map(|s| s.files_created).unwrap_or(0);

        ProgressInfo {
            current_step: ctx.current_step,
            total_steps: ctx.total_steps,
            percentage: percentage(ctx.current_step, ctx.total_steps),
            current_operation: ctx.state.operation().to_string(),
            estimated_remaining_ms,
            files_processed,
        }
    }

    /// One-line bar: `"{bar} {pct}% ({step}/{total}) - {operation}"`.
    pub fn progress_bar_text(&self, progress: &ProgressInfo) -> String {
        let filled = (progress.percentage as usize * self.bar_width / 100).min(self.bar_width);
        let bar = format!(
            "{}{}",
            "█".repeat(filled),
            "░".repeat(self.bar_width - filled)
        );
        format!(
            "{bar} {}% ({}/{}) - {}",
            progress.percentage, progress.current_step, progress.total_steps, progress.current_operation
        )
    }

    /// Markdown summary of a run.
    pub fn progress_report(&self, ctx: &WorkflowContext, stats: Option<&WorkflowStats>) -> String {
        let progress = self.compute(ctx, stats);
        let mut report = String::from("# Workflow Progress Report\n\n");

        report.push_str(&format!("**State:** {}\n", ctx.state));
        report.push_str(&format!(
            "**Progress:** {}% ({}/{})\n",
            progress.percentage, progress.current_step, progress.total_steps
        ));
        report.push_str(&format!("**Current operation:** {}\n", progress.current_operation));
        if let Some(eta) = progress.estimated_remaining_ms {
            report.push_str(&format!("**Estimated time remaining:** {}\n", format_duration_ms(eta)));
        }
        if let Some(err) = &ctx.last_error {
            report.push_str(&format!("**Last error:** {err}\n"));
        }

        report.push_str(&format!("\n## Checkpoints ({})\n\n", ctx.checkpoints.len()));
        for (i, checkpoint) in ctx.checkpoints.iter().enumerate() {
            report.push_str(&format!(
                "{}. `{}` by {} at {} - {}\n",
                i,
                checkpoint.state,
                checkpoint.agent,
                checkpoint.timestamp.format("%Y-%m-%d %H:%M:%S"),
                checkpoint.description
            ));
        }

        if let Some(stats) = stats {
            report.push_str("\n## Statistics\n\n");
            report.push_str(&format!("- Files created: {}\n", stats.files_created));
            report.push_str(&format!("- Files modified: {}\n", stats.files_modified));
            report.push_str(&format!("- Tokens used: {}\n", stats.total_tokens_used));
            report.push_str(&format!("- Errors: {}\n", stats.errors_encountered));
            report.push_str(&format!("- Checkpoints: {}\n", stats.checkpoints_created));
        }

        report
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn percentage(step: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let pct = (f64::from(step) / f64::from(total) * 100.0).round() as u32;
    pct.min(100)
}

/// Render milliseconds as `"1h 2m"`, `"3m 4s"` or `"5s"`.
pub fn format_duration_ms(ms: u64) -> String {
    let secs = ms / 1000;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use devteam_types::workflow::WorkflowState;

    fn ctx_at(step: u32, total: u32) -> WorkflowContext {
        let mut ctx = WorkflowContext::new("/p/Project.md", "/p", total);
        ctx.current_step = step;
        ctx
    }

    #[test]
    fn percentage_rounds_and_saturates() {
        assert_eq!(percentage(0, 10), 0);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(12, 10), 100);
        assert_eq!(percentage(5, 0), 0);
    }

    #[test]
    fn eta_absent_before_first_step() {
        let tracker = ProgressTracker::new();
        let progress = tracker.compute(&ctx_at(0, 10), None);
        assert_eq!(progress.estimated_remaining_ms, None);
        assert_eq!(progress.current_operation, "Creating development plan");
    }

    #[test]
    fn eta_scales_elapsed_by_remaining_steps() {
        let tracker = ProgressTracker::new();
        let mut ctx = ctx_at(2, 10);
        ctx.started_at = Utc::now() - Duration::seconds(20);

        let eta = tracker.compute(&ctx, None).estimated_remaining_ms.unwrap();
        // 10s per step, 8 steps left
        assert!((80_000..=81_000).contains(&eta), "eta was {eta}");
    }

    #[test]
    fn eta_zero_when_past_estimate() {
        let tracker = ProgressTracker::new();
        let progress = tracker.compute(&ctx_at(15, 10), None);
        assert_eq!(progress.estimated_remaining_ms, Some(0));
        assert_eq!(progress.percentage, 100);
    }

    #[test]
    fn bar_text_format() {
        let tracker = ProgressTracker::new();
        let mut ctx = ctx_at(5, 10);
        ctx.state = WorkflowState::BugFixing;

        let text = tracker.progress_bar_text(&tracker.compute(&ctx, None));
        assert_eq!(
            text,
            format!("{}{} 50% (5/10) - Fixing identified issues", "█".repeat(10), "░".repeat(10))
        );
    }

    #[test]
    fn report_lists_checkpoints_and_stats() {
        let tracker = ProgressTracker::new();
        let mut ctx = ctx_at(1, 10);
        ctx.checkpoints.push(devteam_types::workflow::Checkpoint {
            state: WorkflowState::InitialPlanning,
            timestamp: Utc::now(),
            files_created: vec![],
            files_modified: vec![],
            description: "Plan written".to_string(),
            agent: "planner".to_string(),
        });
        let stats = WorkflowStats::new();

        let report = tracker.progress_report(&ctx, Some(&stats));
        assert!(report.starts_with("# Workflow Progress Report"));
        assert!(report.contains("## Checkpoints (1)"));
        assert!(report.contains("`initial_planning` by planner"));
        assert!(report.contains("## Statistics"));
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration_ms(5_400), "5s");
        assert_eq!(format_duration_ms(125_000), "2m 5s");
        assert_eq!(format_duration_ms(3_720_000), "1h 2m");
    }
}
