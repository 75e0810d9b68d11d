// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Terminal color utilities
//!
//! Provides consistent color schemes across the CLI.

use colored::{ColoredString, Colorize};

use crate::bootstrap::ResourceState;
use crate::pipeline::{AttemptOutcome, RunStatus};

/// Style for dimmed/secondary text
pub fn dimmed(msg: &str) -> ColoredString {
    msg.dimmed()
}

/// Colored label for a run status
pub fn run_status(status: &RunStatus) -> ColoredString {
    let label = status.label();
    match status {
        RunStatus::Pending => label.dimmed(),
        RunStatus::Running { .. } => label.blue(),
        RunStatus::Succeeded => label.green().bold(),
        RunStatus::Failed { .. } => label.red().bold(),
        RunStatus::TimedOut { .. } => label.magenta().bold(),
    }
}

/// Colored label for a bootstrap resource state
pub fn resource_state(state: ResourceState) -> ColoredString {
    let label = state.to_string();
    match state {
        ResourceState::Ready => label.green(),
        ResourceState::Absent => label.dimmed(),
        ResourceState::Creating | ResourceState::Deleting => label.blue(),
        ResourceState::Failed => label.red(),
    }
}

/// Marker for a stage attempt outcome
pub fn attempt_marker(outcome: &AttemptOutcome) -> ColoredString {
    match outcome {
        AttemptOutcome::Succeeded => "✓".green(),
        AttemptOutcome::Failed => "✗".red(),
        AttemptOutcome::Cancelled => "⊘".magenta(),
        AttemptOutcome::Running => "→".blue(),
    }
}

/// Print a styled header
pub fn print_header(title: &str) {
    println!("{}", title.bold());
    println!("{}", "═".repeat(title.len().max(40)));
}

/// Print a styled section
pub fn print_section(title: &str) {
    println!();
    println!("{}:", title.bold());
}

/// Print a success check
pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green(), msg);
}

/// Print an error cross
pub fn print_error(msg: &str) {
    println!("  {} {}", "✗".red(), msg);
}

/// Print an info item
pub fn print_info(msg: &str) {
    println!("  {} {}", "→".blue(), msg);
}
