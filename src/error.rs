//! Error types surfaced across the crate. Fatal conditions (allocation
//! failure, programmer errors in the primitive registry) are distinguished
//! from ordinary runtime errors, which the driver reports and the program
//! itself can never catch.

use crate::ast::SourceRange;
use thiserror::Error;

/// The heap could not satisfy an allocation even after a major collection.
/// Fatal: aborts the running script.
#[derive(Debug, Error)]
#[error("out of memory: failed to allocate {requested} bytes")]
pub struct AllocationError {
    pub requested: usize,
}

/// A runtime error unwinds every activation on the stack and is reported by
/// the driver. Programs in this language cannot catch it.
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct RuntimeError {
    pub message: String,
    pub range: SourceRange,
    /// One formatted frame per activation active when the error was raised,
    /// innermost (most recent) first.
    pub trace: Vec<TraceFrame>,
}

#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub label: String,
    pub range: SourceRange,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, range: SourceRange) -> Self {
        RuntimeError { message: message.into(), range, trace: Vec::new() }
    }

    /// Appends one stack frame as the error unwinds through an activation.
    /// Callers append from the inside out, so `trace` ends up ordered
    /// newest (innermost) first, matching spec.md §6's error output format.
    pub fn push_frame(&mut self, label: impl Into<String>, range: SourceRange) {
        self.trace.push(TraceFrame { label: label.into(), range });
    }

    /// Renders spec.md §6's error output format:
    /// `file:line:column: error: <message>` followed by one
    /// `<at name> file:line:column` line per trace frame, newest first.
    /// `file_name` is supplied by the caller rather than stored per node:
    /// a script is loaded as a unit, so its name is known once at the call
    /// site and need not be duplicated into every `SourceRange`.
    pub fn format(&self, file_name: &str) -> String {
        let mut out = format!(
            "{}:{}:{}: error: {}\n",
            file_name, self.range.line, self.range.column, self.message
        );
        for frame in &self.trace {
            out.push_str(&format!(
                "  at {} {}:{}:{}\n",
                frame.label, file_name, frame.range.line, frame.range.column
            ));
        }
        out
    }
}

/// Top-level errors the driver can produce.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
