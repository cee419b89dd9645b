use std::io::Write;

use crate::runtime::error::RuntimeError;

/// Accumulating diagnostic buffer shared by every pipeline stage.
///
/// Stages append rendered messages; the driver flushes the buffer to the
/// embedder's sink after each chunk. Warnings do not set the error flag, so
/// a warning-only run still executes.
#[derive(Debug, Default)]
pub struct Diagnostics {
    messages: Vec<String>,
    had_error: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, line: usize, message: impl AsRef<str>) {
        self.messages
            .push(format!("[line {}]: {}", line, message.as_ref()));
        self.had_error = true;
    }

    pub fn warning(&mut self, line: usize, message: impl AsRef<str>) {
        self.messages
            .push(format!("[line {}] Warning: {}", line, message.as_ref()));
    }

    /// Runtime errors render the line, the message, and at most the top
    /// three frames of the evaluator's call stack.
    pub fn runtime_error(&mut self, error: &RuntimeError) {
        let mut rendered = format!("[line {}] {}", error.line, error.kind);
        for frame in error.stack.iter().take(3) {
            rendered.push_str("\n    at ");
            rendered.push_str(frame);
        }
        self.messages.push(rendered);
        self.had_error = true;
    }

    pub fn had_error(&self) -> bool {
        self.had_error
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Write all buffered messages to `sink`, one per line, and clear the
    /// buffer. The error flag is left untouched so callers can still
    /// inspect it after flushing.
    pub fn flush_to<W: Write + ?Sized>(&mut self, sink: &mut W) {
        for message in self.messages.drain(..) {
            // A broken sink must not tear down the interpreter loop.
            let _ = writeln!(sink, "{message}");
        }
        let _ = sink.flush();
    }
}
