use std::{
    borrow::Cow,
    io::{self, Write as _},
};

use crate::exception::Exception;

/// Trait for handling output from the `Print` instruction.
///
/// Implement this trait to capture or redirect script output. The default
/// implementation `StdPrint` writes to stdout.
pub trait PrintWriter {
    /// Writes the printed form of one value, without a trailing newline.
    fn stdout_write(&mut self, output: Cow<'_, str>) -> Result<(), Exception>;

    /// Adds a single character, used for the newline after each printed value.
    fn stdout_push(&mut self, end: char) -> Result<(), Exception>;
}

/// Default `PrintWriter` that writes to stdout.
///
/// Output is buffered and flushed when the writer is dropped.
#[derive(Debug, Default)]
pub struct StdPrint(String);

impl StdPrint {
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    /// Writes everything buffered so far to stdout.
    ///
    /// Write errors (a closed pipe, say) are ignored: script output is best-effort.
    pub fn flush(&mut self) {
        if self.0.is_empty() {
            return;
        }
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(self.0.as_bytes());
        let _ = stdout.flush();
        self.0.clear();
    }
}

impl PrintWriter for StdPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) -> Result<(), Exception> {
        self.0.push_str(&output);
        Ok(())
    }

    fn stdout_push(&mut self, end: char) -> Result<(), Exception> {
        self.0.push(end);
        if end == '\n' && self.0.len() > 8 * 1024 {
            self.flush();
        }
        Ok(())
    }
}

impl Drop for StdPrint {
    fn drop(&mut self) {
        self.flush();
    }
}

/// A `PrintWriter` that collects all output into a string.
///
/// Useful for testing or capturing print output programmatically.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    /// Returns the collected output as a string slice.
    #[must_use]
    pub fn output(&self) -> &str {
        self.0.as_str()
    }

    /// Consumes the writer and returns the collected output.
    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) -> Result<(), Exception> {
        self.0.push_str(&output);
        Ok(())
    }

    fn stdout_push(&mut self, end: char) -> Result<(), Exception> {
        self.0.push(end);
        Ok(())
    }
}

/// `PrintWriter` that ignores all output.
///
/// Useful for suppressing print output during testing or benchmarking.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn stdout_write(&mut self, _output: Cow<'_, str>) -> Result<(), Exception> {
        Ok(())
    }

    fn stdout_push(&mut self, _end: char) -> Result<(), Exception> {
        Ok(())
    }
}
