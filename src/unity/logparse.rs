//! Editor log classification
//!
//! The editor's batch-mode log is classified line by line, statefully:
//!
//! - An error block starts at the sentinel line the editor prints before
//!   aborting, and ends at the next blank line; everything in between is
//!   accumulated into one structured error message.
//! - Independently, every line runs through the progress extractor, which
//!   recognizes the handful of line shapes worth showing on a compact
//!   display: progress-bar updates, bracketed step counters, and the
//!   verbose shader-compile / asset-import phases.

use regex_lite::Regex;

/// Line the editor prints immediately before the failure diagnostic.
pub const ABORT_SENTINEL: &str = "Aborting batchmode due to failure:";

const PROGRESS_BAR_PREFIX: &str = "DisplayProgressbar: ";

/// Stateful classifier over one build invocation's output lines.
pub struct LogClassifier {
    inside_error_block: bool,
    error_message: String,
    counter: Regex,
}

impl LogClassifier {
    pub fn new() -> Self {
        Self {
            inside_error_block: false,
            error_message: String::new(),
            counter: Regex::new(r"(\[.*?\d+/\d+.*?\]|\[BUSY.*?\])").expect("counter pattern"),
        }
    }

    /// Feed one trimmed line. Returns the compact progress fragment when
    /// the line carries one.
    pub fn observe(&mut self, line: &str) -> Option<String> {
        if self.inside_error_block {
            if line.is_empty() {
                self.inside_error_block = false;
            } else {
                if !self.error_message.is_empty() {
                    self.error_message.push('\n');
                }
                self.error_message.push_str(line);
            }
        }
        if line == ABORT_SENTINEL {
            self.inside_error_block = true;
        }
        self.progress_fragment(line)
    }

    /// The accumulated error-block text, lines joined by newlines. Empty
    /// when no error block was seen.
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    fn progress_fragment(&self, line: &str) -> Option<String> {
        if let Some(rest) = line.strip_prefix(PROGRESS_BAR_PREFIX) {
            return Some(rest.to_string());
        }
        if line.starts_with("Compiling shader") || line.starts_with("Start importing ") {
            return Some(line.to_string());
        }
        if line.starts_with('[') {
            if let Some(found) = self.counter.find(line) {
                let rest = line[found.end()..].trim();
                if !rest.is_empty() {
                    return Some(rest.to_string());
                }
            }
        }
        None
    }
}

impl Default for LogClassifier {
    fn default() -> Self {
        Self::new()
    }
}
