//! Destinations for reports written during a run.

use parking_lot::Mutex;
use std::io::Write;

/// Receives reports written by the default error handler.
pub trait OperatorOutput: Send + Sync {
    /// Writes one report.
    fn write_report(&self, report: &str);
}

/// Writes reports to standard error.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrOutput;

impl OperatorOutput for StderrOutput {
    fn write_report(&self, report: &str) {
        let mut stderr = std::io::stderr().lock();
        if let Err(e) = writeln!(stderr, "{report}") {
            tracing::warn!(error = %e, "Failed to write report to stderr");
        }
    }
}

/// Keeps reports in memory.
#[derive(Debug, Default)]
pub struct CollectingOutput {
    reports: Mutex<Vec<String>>,
}

impl CollectingOutput {
    /// Creates an empty output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every report written so far.
    #[must_use]
    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().clone()
    }

    /// Returns the most recent report.
    #[must_use]
    pub fn last(&self) -> Option<String> {
        self.reports.lock().last().cloned()
    }
}

impl OperatorOutput for CollectingOutput {
    fn write_report(&self, report: &str) {
        self.reports.lock().push(report.to_string());
    }
}
