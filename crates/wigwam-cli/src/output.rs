//! Formatted output helpers for CLI commands.

use std::fmt::Write;

use wigwam_workflow::engine::WorkflowReport;

/// Formats a duration given in milliseconds as `1.5s` or `2m03s`.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_seconds(millis: i64) -> String {
    if millis < 60_000 {
        format!("{:.1}s", millis as f64 / 1000.0)
    } else {
        format!("{}m{:02}s", millis / 60_000, (millis % 60_000) / 1000)
    }
}

/// Renders a workflow report as one line per step plus a summary line.
#[must_use]
pub fn format_report(report: &WorkflowReport) -> String {
    let mut out = String::new();
    for step in &report.steps {
        let elapsed = step
            .finished_at
            .map_or_else(String::new, |end| {
                format_seconds((end - step.started_at).num_milliseconds())
            });
        let _ = writeln!(out, "{:<10} {:<24} {elapsed}", step.state.to_string(), step.label);
    }
    let total = report.finished_at.map_or_else(String::new, |end| {
        format!(" in {}", format_seconds((end - report.started_at).num_milliseconds()))
    });
    let _ = writeln!(
        out,
        "{}:{} {} on {}{total}",
        report.workflow, report.test, report.state, report.image
    );
    out
}
