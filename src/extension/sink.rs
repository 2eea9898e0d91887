//! Diagnostic output of extensions
//!
//! Whatever an extension prints is forwarded verbatim, once per actual
//! evaluation. Cache hits never reach a sink.

use crate::extension::ExtensionId;
use std::sync::Mutex;

/// Receives extension diagnostics
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, extension: &ExtensionId, message: &str);
}

/// Prints diagnostics to stderr as `DEBUG: <label>: <message>`
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn emit(&self, extension: &ExtensionId, message: &str) {
        eprintln!("{}", format_diagnostic(extension, message));
    }
}

/// Keeps diagnostics in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    lines: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far, formatted like [`StderrSink`]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Number of emitted lines containing `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.lines().iter().filter(|l| l.contains(needle)).count()
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, extension: &ExtensionId, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(format_diagnostic(extension, message));
        }
    }
}

/// Render one diagnostic line
pub fn format_diagnostic(extension: &ExtensionId, message: &str) -> String {
    format!("DEBUG: {}: {}", extension, message)
}
