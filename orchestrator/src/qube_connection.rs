//! Run the agent inside a qube: transfer the agent
//! payload, execute the entrypoint either blocking or with live progress,
//! read back the per-qube log file, and clean up on exit.
//!
//! Grounded on `qube_connection.py`'s `QubeConnection`: enter/exit
//! lifecycle, `transfer_agent`'s mkdir+tar.gz+untar dance, and the two
//! `_run_command_and_*` execution modes.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use qubes_update_core::{ExitCode, FinalStatus, ProcessResult};

use crate::transport::{AgentProcess, AgentTransport};

/// A progress/completion event for one qube, forwarded to the scheduler's
/// status channel and on to the progress UI.
#[derive(Debug, Clone)]
pub enum StatusUpdate {
    Updating { qube: String, percent: f64 },
    Done { qube: String, status: FinalStatus },
}

/// Builds the in-memory `.tar.gz` for `src_dir`. Kept separate from [`QubeConnection`] so it can be
/// unit tested without a transport.
pub fn archive_dir(src_dir: &Path) -> std::io::Result<Vec<u8>> {
    let base_dir = src_dir
        .file_name()
        .expect("src_dir must not end in '..'")
        .to_string_lossy()
        .into_owned();
    let root_dir = src_dir.parent().unwrap_or_else(|| Path::new("."));

    let mut gz = Vec::new();
    {
        let encoder = flate2::write::GzEncoder::new(&mut gz, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all(&base_dir, root_dir.join(&base_dir))?;
        builder.into_inner()?.finish()?;
    }
    Ok(gz)
}

/// Owns the lifetime of one qube's agent run: open, transfer, execute,
/// collect logs, close. One `QubeConnection` per qube per orchestrator
/// invocation.
pub struct QubeConnection<'a, T: AgentTransport> {
    qube: String,
    dest_dir: String,
    cleanup: bool,
    transport: &'a T,
    status_tx: flume::Sender<StatusUpdate>,
    initially_running: bool,
    connected: bool,
    /// Unknown until a run either completes or is abandoned; the
    /// unconditional `Done` guard on close defaults to `Unknown`, not `Error`.
    status: FinalStatus,
}

impl<'a, T: AgentTransport> QubeConnection<'a, T> {
    /// Opens the connection, recording whether the qube was already
    /// running.
    pub fn open(
        qube: impl Into<String>,
        dest_dir: impl Into<String>,
        cleanup: bool,
        transport: &'a T,
        status_tx: flume::Sender<StatusUpdate>,
        initially_running: bool,
    ) -> Self {
        Self {
            qube: qube.into(),
            dest_dir: dest_dir.into(),
            cleanup,
            transport,
            status_tx,
            initially_running,
            connected: true,
            status: FinalStatus::Unknown,
        }
    }

    pub fn qube(&self) -> &str {
        &self.qube
    }

    /// Copies the already-built archive into `self.dest_dir` inside the
    /// qube and extracts it.
    pub fn transfer_agent(&mut self, archive: &[u8], base_name: &str) -> ProcessResult {
        assert!(self.connected, "open the connection first");

        let dest_dir = self.dest_dir.clone();
        let dest_arch = format!("{dest_dir}/{base_name}.tar.gz");

        let mut result = self.run_blocking(&["mkdir", "-p", &dest_dir]);
        if result.is_err() {
            return result;
        }

        result.add(self.copy_file_to_qube(archive, &dest_arch));
        if result.is_err() {
            return result;
        }

        result.add(self.run_blocking(&["tar", "-xzf", &dest_arch, "-C", &dest_dir]));
        result
    }

    fn copy_file_to_qube(&mut self, bytes: &[u8], dest: &str) -> ProcessResult {
        // A real transport pipes `bytes` to the command's stdin; captured
        // here only as the argv shape, since `AgentTransport::run_with_args`
        // does not carry stdin in this design.
        let _ = bytes;
        let argv = vec!["sh".to_string(), "-c".to_string(), format!("cat > {dest}")];
        self.run_blocking_owned(&argv)
    }

    /// Marks the entrypoint executable, then runs it, reporting live
    /// progress if `show_progress`.
    pub fn run_entrypoint(
        &mut self,
        entrypoint_path: &str,
        cli_args: &[String],
        show_progress: bool,
    ) -> ProcessResult {
        let mut result = self.run_blocking(&["chmod", "u+x", entrypoint_path]);

        let mut command = vec![entrypoint_path.to_string()];
        command.extend(cli_args.iter().cloned());

        let run_result = if show_progress {
            self.run_streaming(&command)
        } else {
            self.run_blocking_owned(&command)
        };
        result.add(run_result);
        result
    }

    pub fn read_logs(&mut self, log_path: &str) -> ProcessResult {
        self.run_blocking(&["cat", log_path])
    }

    fn run_blocking(&mut self, argv: &[&str]) -> ProcessResult {
        let owned: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
        self.run_blocking_owned(&owned)
    }

    fn run_blocking_owned(&mut self, argv: &[String]) -> ProcessResult {
        let result = self.transport.run_with_args(&self.qube, argv);
        if result.code == ExitCode::OkNoUpdates {
            self.status = FinalStatus::NoUpdates;
        }
        result
    }

    /// Runs `argv` via the streaming exec service, consuming stderr as a
    /// sequence of progress percentages until the terminal `100.00` line,
    /// then as ordinary captured stderr.
    fn run_streaming(&mut self, argv: &[String]) -> ProcessResult {
        let mut proc = match self.transport.run_service(&self.qube, argv) {
            Ok(p) => p,
            Err(e) => return ProcessResult::new(ExitCode::ErrQrexec, "", format!("exec failed: {e}")),
        };

        let mut stdout_handle = proc.take_stdout();
        let mut stderr_handle = proc.take_stderr();
        let qube = self.qube.clone();
        let tx = self.status_tx.clone();

        let (stdout, stderr) = std::thread::scope(|scope| {
            let out_task = scope.spawn(move || collect_stdout(stdout_handle.as_mut()));
            let err_task =
                scope.spawn(move || collect_stderr_with_progress(stderr_handle.as_mut(), &qube, &tx));
            (
                out_task.join().unwrap_or_default(),
                err_task.join().unwrap_or_default(),
            )
        });

        let raw_code = proc.wait();
        let result = ProcessResult::from_streams(
            ExitCode::from_agent_raw(raw_code),
            &stdout,
            &stderr,
        );
        if result.code == ExitCode::OkNoUpdates {
            self.status = FinalStatus::NoUpdates;
        }
        result
    }

    /// Runs final cleanup: post a `Done` status,
    /// remove the remote work directory if requested, shut the qube down
    /// if this connection started it.
    pub fn close(mut self, final_status: FinalStatus, shutdown_if_started: impl FnOnce(&str) -> bool) {
        self.status = final_status;
        let _ = self.status_tx.send(StatusUpdate::Done {
            qube: self.qube.clone(),
            status: self.status,
        });

        if self.cleanup {
            let dest_dir = self.dest_dir.clone();
            let result = self.run_blocking(&["rm", "-r", &dest_dir]);
            if result.is_err() {
                tracing::error!(qube = %self.qube, err = %result.err, "failed to remove {}", dest_dir);
            }
        }

        if !self.initially_running {
            shutdown_if_started(&self.qube);
        }

        self.connected = false;
    }
}

pub(crate) fn collect_stdout(stdout: &mut dyn Read) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = stdout.read_to_end(&mut buf);
    buf
}

pub(crate) fn collect_stderr_with_progress(
    stderr: &mut dyn Read,
    qube: &str,
    tx: &flume::Sender<StatusUpdate>,
) -> Vec<u8> {
    let mut reader = BufReader::new(stderr);
    let mut leftover = Vec::new();
    let mut progress_finished = false;
    let mut line = String::new();

    loop {
        line.clear();
        let n = match reader.read_line(&mut line) {
            Ok(n) => n,
            Err(_) => break,
        };
        if n == 0 {
            break;
        }

        if !progress_finished {
            match line.trim_end().parse::<f64>() {
                Ok(percent) => {
                    if percent >= 100.0 {
                        progress_finished = true;
                    }
                    let _ = tx.send(StatusUpdate::Updating {
                        qube: qube.to_string(),
                        percent,
                    });
                    continue;
                }
                Err(_) => {
                    leftover.extend_from_slice(line.as_bytes());
                    continue;
                }
            }
        }
        leftover.extend_from_slice(line.as_bytes());
    }

    leftover
}
