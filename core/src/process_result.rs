//! Accumulator of (exit code, stdout, stderr) across composed steps.

use std::io::Write;

use crate::exit_code::ExitCode;
use crate::sanitize::sanitize;

/// Running result of one or more composed subprocess-like steps.
///
/// `realtime` marks a result whose newly-added bytes should also be
/// flushed to the real stdout/stderr exactly once; `posted` guards that
/// double-flush.
#[derive(Debug, Clone, Default)]
pub struct ProcessResult {
    pub code: ExitCode,
    pub out: String,
    pub err: String,
    pub realtime: bool,
    posted: bool,
}

impl ProcessResult {
    pub fn new(code: ExitCode, out: impl Into<String>, err: impl Into<String>) -> Self {
        Self {
            code,
            out: out.into(),
            err: err.into(),
            realtime: false,
            posted: false,
        }
    }

    pub fn realtime(code: ExitCode, out: impl Into<String>, err: impl Into<String>) -> Self {
        Self {
            realtime: true,
            ..Self::new(code, out, err)
        }
    }

    /// Build a result from raw, possibly non-UTF8 subprocess output,
    /// discarding bytes that don't survive sanitisation.
    pub fn from_streams(code: ExitCode, out: &[u8], err: &[u8]) -> Self {
        Self::new(code, sanitize(out), sanitize(err))
    }

    pub fn is_err(&self) -> bool {
        self.code != ExitCode::Ok
    }

    /// Merge `other` into `self`: code is worst-wins, streams concatenate.
    /// If `self.realtime` and `other` has not yet been posted, `other`'s
    /// non-empty streams are written to the real stdout/stderr once.
    pub fn add(&mut self, mut other: ProcessResult) {
        if self.realtime && !other.posted {
            if !other.out.is_empty() {
                let _ = std::io::stdout().write_all(other.out.as_bytes());
            }
            if !other.err.is_empty() {
                let _ = std::io::stderr().write_all(other.err.as_bytes());
            }
            other.posted = true;
        }
        self.code = self.code.combine(other.code);
        self.out.push_str(&other.out);
        self.err.push_str(&other.err);
    }

    /// Scan the combined text for lines starting (case-insensitively)
    /// with "err"; if found, force the code to `ExitCode::Err` unless it
    /// is already something worse.
    pub fn error_from_messages(&mut self) {
        let has_err_line = self
            .out
            .lines()
            .chain(self.err.lines())
            .any(|line| line.len() >= 3 && line[..3].eq_ignore_ascii_case("err"));
        if has_err_line {
            self.code = self.code.combine(ExitCode::Err);
        }
    }
}
