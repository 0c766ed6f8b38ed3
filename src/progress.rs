//! Progress bar utilities for CLI operations
//!
//! Provides progress indicators for build and install phases using indicatif.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Style presets for different types of progress indicators
pub struct ProgressStyles;

impl ProgressStyles {
    /// Style for file processing operations (shows count and speed)
    pub fn files() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) {msg}",
        )
        .unwrap()
        .progress_chars("█▓▒░  ")
    }

    /// Style for indeterminate operations (spinner only)
    pub fn spinner() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}]")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
    }

    /// Style for success message
    pub fn success() -> ProgressStyle {
        ProgressStyle::with_template("{prefix:.green} {msg}").unwrap()
    }

    /// Style for error message
    pub fn error() -> ProgressStyle {
        ProgressStyle::with_template("{prefix:.red} {msg}").unwrap()
    }
}

/// Progress tracker for build and install phases
pub struct SetupProgress {
    multi: MultiProgress,
}

impl SetupProgress {
    /// Create a new progress tracker
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
        }
    }

    /// Print a success message
    pub fn success(&self, msg: &str) {
        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(ProgressStyles::success());
        pb.set_prefix("✓");
        pb.finish_with_message(msg.to_string());
    }

    /// Print an info message
    pub fn info(&self, msg: &str) {
        self.multi.println(format!("  ℹ {}", msg)).ok();
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        self.multi.println(format!("  ⚠ {}", msg)).ok();
    }
}

impl Default for SetupProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper trait for progress bar operations
pub trait ProgressExt {
    /// Finish with a success message
    fn finish_success(&self, msg: &str);

    /// Finish with an error message
    fn finish_error(&self, msg: &str);
}

impl ProgressExt for ProgressBar {
    fn finish_success(&self, msg: &str) {
        self.set_style(ProgressStyles::success());
        self.set_prefix("✓");
        self.finish_with_message(msg.to_string());
    }

    fn finish_error(&self, msg: &str) {
        self.set_style(ProgressStyles::error());
        self.set_prefix("✗");
        self.finish_with_message(msg.to_string());
    }
}

/// Create a simple spinner for quick operations
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyles::spinner());
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Create a simple progress bar for file operations
pub fn progress_bar(total: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(ProgressStyles::files());
    pb.set_message(msg.to_string());
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_styles() {
        // Just verify styles can be created without panicking
        let _ = ProgressStyles::files();
        let _ = ProgressStyles::spinner();
        let _ = ProgressStyles::success();
        let _ = ProgressStyles::error();
    }

    #[test]
    fn test_setup_progress() {
        let progress = SetupProgress::new();
        progress.success("done");
        progress.info("note");
        progress.warn("careful");
    }
}
