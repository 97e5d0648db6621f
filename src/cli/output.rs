//! CLI output formatting

use crate::{
    adapters::Mutation,
    core::{PipelineStatus, RunReport, StageOutcome},
    core::resolver::ValueSource,
    execution::ExecutionEvent,
    persistence::RunSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a spinner for a running stage
pub fn create_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Horizontal rule spanning the terminal
pub fn separator() -> String {
    let width = term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80);
    style("─".repeat(width)).dim().to_string()
}

/// Format a pipeline status for display
pub fn format_status(status: PipelineStatus) -> String {
    match status {
        PipelineStatus::Idle => style("IDLE").dim().to_string(),
        PipelineStatus::Running => style("RUNNING").yellow().to_string(),
        PipelineStatus::Completed => style("COMPLETED").green().to_string(),
        PipelineStatus::Aborted => style("ABORTED").red().to_string(),
    }
}

pub fn format_source(source: ValueSource) -> String {
    match source {
        ValueSource::Explicit => style(source).cyan().to_string(),
        ValueSource::Environment => style(source).yellow().to_string(),
        ValueSource::InfrastructureState => style(source).blue().to_string(),
        ValueSource::Default => style(source).dim().to_string(),
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            run_id,
            pipeline_name,
            total_stages,
        } => format!(
            "{} Deploying {} ({} stages, run {})",
            ROCKET,
            style(pipeline_name).bold(),
            total_stages,
            style(&run_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::StageStarted { stage_id, description } => {
            format!("{} {} {}", SPINNER, style(stage_id).cyan(), style(description).dim())
        }
        ExecutionEvent::StageSucceeded { stage_id, outcome } => match outcome {
            StageOutcome::Applied => format!("{} {}", CHECK, style(stage_id).green()),
            StageOutcome::AlreadySatisfied => {
                let note = style("(already satisfied)").dim();
                format!("{} {} {}", SKIP, style(stage_id).green(), note)
            }
        },
        ExecutionEvent::StageFailed { stage_id, error } => {
            format!("{} {}: {}", CROSS, style(stage_id).red(), style(error).dim())
        }
        ExecutionEvent::PipelineFinished { run_id, status } => format!(
            "{} Run {} {}",
            INFO,
            style(&run_id.to_string()[..8]).dim(),
            format_status(*status)
        ),
    }
}

/// Prints events, with a spinner while a stage is running
#[derive(Default)]
pub struct ConsoleReporter {
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, event: &ExecutionEvent) {
        let mut spinner = self.spinner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(running) = spinner.take() {
            running.finish_and_clear();
        }

        match event {
            ExecutionEvent::StageStarted { stage_id, description } => {
                let message = format!("{} {}", style(stage_id).cyan(), style(description).dim());
                *spinner = Some(create_spinner(message));
            }
            other => println!("{}", format_execution_event(other)),
        }
    }
}

/// Format a finished run for display
pub fn format_report(report: &RunReport) -> String {
    let mut lines = vec![format!(
        "  Status: {} in {:.1}s",
        format_status(report.status),
        report.duration_secs()
    )];
    if !report.applied.is_empty() {
        lines.push(format!("  Applied: {}", style(report.applied.join(", ")).green()));
    }
    if !report.skipped.is_empty() {
        lines.push(format!("  Already satisfied: {}", style(report.skipped.join(", ")).dim()));
    }
    if let Some(aborted) = &report.aborted {
        lines.push(format!(
            "  Aborted at: {} ({})",
            style(&aborted.stage).red(),
            style(&aborted.reason).dim()
        ));
    }
    lines.join("\n")
}

/// Format run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        PipelineStatus::Completed => CHECK,
        PipelineStatus::Aborted => CROSS,
        PipelineStatus::Running => SPINNER,
        PipelineStatus::Idle => INFO,
    };

    let mut line = format!(
        "{} {} - {} - {} - {} ({} applied, {} skipped)",
        status_icon,
        style(&summary.run_id.to_string()[..8]).dim(),
        style(&summary.deployment).bold(),
        style(summary.started_at.format("%Y-%m-%d %H:%M")).dim(),
        format_status(summary.status),
        summary.applied.len(),
        summary.skipped.len()
    );
    if let Some(stage) = &summary.aborted_stage {
        line.push_str(&format!(" at {}", style(stage).red()));
    }
    line
}

pub fn format_mutation(index: usize, mutation: &Mutation) -> String {
    format!("  {:>2}. {}", index + 1, mutation.describe())
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
