//! Per-qube agent run: transfer, execute, collect logs. Grounded on `update_manager.py`'s `UpdateAgentManager`/`run_agent`.

use std::io::Write;
use std::path::{Path, PathBuf};

use qubes_update_core::{ExitCode, FinalStatus, ProcessResult};

use crate::qube_connection::{
    archive_dir, collect_stderr_with_progress, collect_stdout, QubeConnection, StatusUpdate,
};
use crate::transport::{AgentProcess, AgentTransport};

const AGENT_RELATIVE_DIR: &str = "agent";
// The transferred payload is the compiled `qubes-update-agent` binary.
const ENTRYPOINT: &str = "agent/qubes-update-agent";
const WORKDIR: &str = "/run/qubes-update/";
const LOGDIR: &str = "/var/log/qubes";

/// Directory holding one append-only log file per qube
/// (`update-<qube>.log`), for callers building a [`QubeLog`].
pub fn host_log_dir() -> &'static Path {
    Path::new(LOGDIR)
}

/// Outcome of one qube's agent run, reported back to the scheduler.
pub struct RunOutcome {
    pub qube: String,
    pub status: FinalStatus,
    pub code: ExitCode,
    /// Either the raw output lines (when `--show-output`) or a one-line
    /// `"OK"` / `"ERROR (...)"` summary.
    pub summary: Vec<String>,
}

/// A dedicated append-only log file for one qube (a file-scoped writer
/// doesn't fit the process-wide `tracing` subscriber set up in
/// [`crate::logging`], so this stays a plain file handle rather than
/// another tracing layer).
pub struct QubeLog {
    file: std::fs::File,
    qube: String,
}

impl QubeLog {
    pub fn open(qube: &str, log_dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(log_dir)?;
        let path = log_dir.join(format!("update-{qube}.log"));
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self { file, qube: qube.to_string() })
    }

    pub fn info(&mut self, msg: &str) {
        let _ = writeln!(self.file, "{} INFO {}", timestamp(), msg);
    }

    pub fn error(&mut self, msg: &str) {
        let _ = writeln!(self.file, "{} ERROR {}", timestamp(), msg);
    }

    /// Agent log lines already carry their own timestamp; write verbatim.
    pub fn agent_line(&mut self, line: &str) {
        let _ = writeln!(self.file, "{line}");
    }

    pub fn qube(&self) -> &str {
        &self.qube
    }
}

fn timestamp() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", now.as_secs())
}

/// Transfers the agent payload into `qube`, runs its entrypoint, and reads
/// back the agent's own log file.
pub fn run_agent<T: AgentTransport>(
    qube: &str,
    agent_src_dir: &Path,
    cli_args: &[String],
    show_progress: bool,
    show_output: bool,
    cleanup: bool,
    transport: &T,
    status_tx: flume::Sender<StatusUpdate>,
    initially_running: bool,
    shutdown_if_started: impl FnOnce(&str) -> bool,
    log: &mut QubeLog,
) -> RunOutcome {
    log.info(&format!("Running update agent for {qube}"));

    let mut conn = QubeConnection::open(qube, WORKDIR, cleanup, transport, status_tx, initially_running);

    let outcome = run_agent_inner(&mut conn, agent_src_dir, cli_args, show_progress, log);

    conn.close(outcome.status, shutdown_if_started);

    RunOutcome {
        qube: qube.to_string(),
        status: outcome.status,
        code: outcome.code,
        summary: build_summary(outcome.code, &outcome.result, &qube_log_path(qube), show_output),
    }
}

struct InnerOutcome {
    code: ExitCode,
    status: FinalStatus,
    result: ProcessResult,
}

fn run_agent_inner<T: AgentTransport>(
    conn: &mut QubeConnection<'_, T>,
    agent_src_dir: &Path,
    cli_args: &[String],
    show_progress: bool,
    log: &mut QubeLog,
) -> InnerOutcome {
    log.info(&format!("Transferring files to destination qube: {}", conn.qube()));

    let base_name = AGENT_RELATIVE_DIR;
    let archive = match archive_dir(agent_src_dir) {
        Ok(bytes) => bytes,
        Err(e) => {
            log.error(&format!("Failed to build agent archive: {e}"));
            return InnerOutcome {
                code: ExitCode::ErrQrexec,
                status: FinalStatus::Error,
                result: ProcessResult::new(ExitCode::ErrQrexec, "", e.to_string()),
            };
        }
    };

    let transfer_result = conn.transfer_agent(&archive, base_name);
    if transfer_result.is_err() {
        log.error(&format!("Qube communication error code: {}", transfer_result.code.code()));
        return InnerOutcome {
            code: transfer_result.code,
            status: FinalStatus::Error,
            result: transfer_result,
        };
    }

    log.info(&format!("The agent is starting the task in qube: {}", conn.qube()));
    let dest_agent = format!("{WORKDIR}{ENTRYPOINT}");
    let run_result = conn.run_entrypoint(&dest_agent, cli_args, show_progress);
    // `run_result` first: `transfer_result` is already confirmed non-error
    // above and is almost always `Ok`, and `Ok`/`OkNoUpdates` rank equal in
    // `combine`, so putting the run's own code first preserves a genuine
    // per-qube `OkNoUpdates` instead of a tie silently falling back to `Ok`.
    let code = run_result.code.combine(transfer_result.code);

    let logs_result = conn.read_logs(&format!("{LOGDIR}/qubes-update/update-agent.log"));
    if logs_result.is_err() {
        log.error(&format!(
            "Problem with collecting logs from {}, return code: {}",
            conn.qube(),
            logs_result.code.code()
        ));
    } else {
        for line in logs_result.out.lines() {
            log.agent_line(line);
        }
    }

    let status = classify_status(code);
    log.info(&format!("agent exit code: {}", code.code()));

    InnerOutcome { code, status, result: run_result }
}

/// Runs the agent directly on the host with no transfer/workdir hop, for
/// the AdminVM, which already has the agent binary installed locally.
pub fn run_agent_local<T: AgentTransport>(
    qube: &str,
    entrypoint: &Path,
    cli_args: &[String],
    show_progress: bool,
    show_output: bool,
    transport: &T,
    status_tx: &flume::Sender<StatusUpdate>,
    log: &mut QubeLog,
) -> RunOutcome {
    log.info(&format!("Running update agent for {qube}"));

    let mut command = vec![entrypoint.display().to_string()];
    command.extend(cli_args.iter().cloned());

    let result = if show_progress {
        run_local_streaming(transport, qube, &command, status_tx)
    } else {
        transport.run_with_args(qube, &command)
    };

    for line in result.out.lines().chain(result.err.lines()) {
        log.agent_line(line);
    }

    let status = classify_status(result.code);
    let _ = status_tx.send(StatusUpdate::Done { qube: qube.to_string(), status });
    log.info(&format!("agent exit code: {}", result.code.code()));

    RunOutcome {
        qube: qube.to_string(),
        status,
        code: result.code,
        summary: build_summary(result.code, &result, &qube_log_path(qube), show_output),
    }
}

fn run_local_streaming<T: AgentTransport>(
    transport: &T,
    qube: &str,
    command: &[String],
    status_tx: &flume::Sender<StatusUpdate>,
) -> ProcessResult {
    let mut proc = match transport.run_service(qube, command) {
        Ok(p) => p,
        Err(e) => return ProcessResult::new(ExitCode::ErrQrexec, "", format!("exec failed: {e}")),
    };

    let mut stdout_handle = proc.take_stdout();
    let mut stderr_handle = proc.take_stderr();
    let tx = status_tx.clone();

    let (stdout, stderr) = std::thread::scope(|scope| {
        let out_task = scope.spawn(move || collect_stdout(stdout_handle.as_mut()));
        let err_task = scope.spawn(move || collect_stderr_with_progress(stderr_handle.as_mut(), qube, &tx));
        (out_task.join().unwrap_or_default(), err_task.join().unwrap_or_default())
    });

    let raw_code = proc.wait();
    ProcessResult::from_streams(ExitCode::from_agent_raw(raw_code), &stdout, &stderr)
}

fn classify_status(code: ExitCode) -> FinalStatus {
    if !code.is_vm_handled() {
        return FinalStatus::Error;
    }
    match code {
        ExitCode::OkNoUpdates => FinalStatus::NoUpdates,
        ExitCode::Ok => FinalStatus::Success,
        _ => FinalStatus::Error,
    }
}

fn qube_log_path(qube: &str) -> PathBuf {
    Path::new(LOGDIR).join(format!("update-{qube}.log"))
}

fn build_summary(code: ExitCode, result: &ProcessResult, log_path: &Path, show_output: bool) -> Vec<String> {
    if show_output && !result.out.is_empty() {
        return result.out.lines().map(str::to_string).collect();
    }
    if code == ExitCode::Ok || code == ExitCode::OkNoUpdates {
        vec!["OK".to_string()]
    } else {
        vec![format!(
            "ERROR (exit code {}, details in {})",
            code.code(),
            log_path.display()
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockAgentTransport;

    #[test]
    fn build_summary_ok_code() {
        let result = ProcessResult::new(ExitCode::Ok, "", "");
        let summary = build_summary(ExitCode::Ok, &result, Path::new("/var/log/x.log"), false);
        assert_eq!(summary, vec!["OK".to_string()]);
    }

    #[test]
    fn build_summary_error_mentions_log_path() {
        let result = ProcessResult::new(ExitCode::ErrVmUpdate, "", "");
        let summary = build_summary(ExitCode::ErrVmUpdate, &result, Path::new("/var/log/x.log"), false);
        assert!(summary[0].contains("/var/log/x.log"));
        assert!(summary[0].contains("24"));
    }

    #[test]
    fn build_summary_show_output_returns_raw_lines() {
        let result = ProcessResult::new(ExitCode::Ok, "line1\nline2", "");
        let summary = build_summary(ExitCode::Ok, &result, Path::new("/var/log/x.log"), true);
        assert_eq!(summary, vec!["line1".to_string(), "line2".to_string()]);
    }

    #[test]
    fn run_agent_inner_propagates_transfer_failure() {
        let mut transport = MockAgentTransport::new();
        transport
            .expect_run_with_args()
            .returning(|_, _| ProcessResult::new(ExitCode::ErrQrexec, "", "no route"));
        let (tx, _rx) = flume::unbounded();
        let mut conn = QubeConnection::open("work", WORKDIR, true, &transport, tx, true);
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("agent");
        std::fs::create_dir(&payload).unwrap();
        std::fs::write(payload.join("entrypoint.py"), b"x").unwrap();

        let log_dir = tempfile::tempdir().unwrap();
        let mut log = QubeLog::open("work", log_dir.path()).unwrap();
        let outcome = run_agent_inner(&mut conn, &payload, &[], false, &mut log);
        assert_eq!(outcome.status, FinalStatus::Error);
        assert_eq!(outcome.code, ExitCode::ErrQrexec);
    }

    #[test]
    fn classify_status_maps_vm_handled_codes() {
        assert_eq!(classify_status(ExitCode::Ok), FinalStatus::Success);
        assert_eq!(classify_status(ExitCode::OkNoUpdates), FinalStatus::NoUpdates);
        assert_eq!(classify_status(ExitCode::ErrVmUpdate), FinalStatus::Error);
        assert_eq!(classify_status(ExitCode::ErrVmUnhandled), FinalStatus::Error);
    }

    #[test]
    fn run_agent_local_skips_transfer_and_reports_done() {
        let mut transport = MockAgentTransport::new();
        transport
            .expect_run_with_args()
            .returning(|_, _| ProcessResult::new(ExitCode::Ok, "updated 3 packages", ""));
        let (tx, rx) = flume::unbounded();
        let log_dir = tempfile::tempdir().unwrap();
        let mut log = QubeLog::open("dom0", log_dir.path()).unwrap();

        let outcome = run_agent_local(
            "dom0",
            Path::new("/usr/bin/qubes-update-agent"),
            &["--quiet".to_string()],
            false,
            false,
            &transport,
            &tx,
            &mut log,
        );

        assert_eq!(outcome.status, FinalStatus::Success);
        assert_eq!(outcome.code, ExitCode::Ok);
        match rx.try_recv().unwrap() {
            StatusUpdate::Done { qube, status } => {
                assert_eq!(qube, "dom0");
                assert_eq!(status, FinalStatus::Success);
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }
}
