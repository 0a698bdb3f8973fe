//! Shared subprocess plumbing for CLI-variant drivers.

use std::process::{Command, Stdio};

use qubes_update_core::{ExitCode, ProcessResult};
use tracing::debug;

/// Run `argv[0] argv[1..]` and wait. When `realtime` the child inherits
/// the real stdout/stderr (matching `run_cmd(realtime=True)`'s direct
/// passthrough); the returned result is marked `realtime` so the caller's
/// `ProcessResult::add` does not double-flush already-visible output.
pub fn run_cmd(argv: &[&str], realtime: bool) -> ProcessResult {
    debug!("run command: {}", argv.join(" "));
    let mut cmd = Command::new(argv[0]);
    cmd.args(&argv[1..]);

    let output = if realtime {
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        cmd.status().map(|status| (status, Vec::new(), Vec::new()))
    } else {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.output().map(|out| (out.status, out.stdout, out.stderr))
    };

    let result = match output {
        Ok((status, out, err)) => {
            let code = ExitCode::from_raw(status.code().unwrap_or(1)).unwrap_or(ExitCode::Err);
            if realtime {
                let mut r = ProcessResult::realtime(code, "", "");
                // the child already wrote to the real fds; mark as posted
                // by constructing through `add` against an empty base so
                // no further bytes are double-flushed.
                r.add(ProcessResult::new(code, "", ""));
                r
            } else {
                ProcessResult::from_streams(code, &out, &err)
            }
        }
        Err(e) => ProcessResult::new(ExitCode::ErrVmUnhandled, "", format!("failed to exec: {e}")),
    };
    debug!("command exit code: {}", result.code.code());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonrealtime_captures_output() {
        let result = run_cmd(&["echo", "hello"], false);
        assert_eq!(result.code, ExitCode::Ok);
        assert_eq!(result.out.trim(), "hello");
    }

    #[test]
    fn missing_binary_is_unhandled() {
        let result = run_cmd(&["qubes-update-agent-definitely-missing-binary"], false);
        assert_eq!(result.code, ExitCode::ErrVmUnhandled);
    }
}
