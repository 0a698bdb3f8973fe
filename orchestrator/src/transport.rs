//! The RPC transport between dom0 and a qube, treated as two opaque
//! services: "run command with argv, return (stdout,
//! stderr, exit)" and "exec service returning a subprocess handle with
//! readable stdout/stderr and a waitable return code".

use std::io::Read;
use std::process::{Command, Stdio};

use qubes_update_core::{ExitCode, ProcessResult};

/// A live handle to a remote (or local) running process: independently
/// readable stdout/stderr and a waitable exit code.
#[cfg_attr(test, mockall::automock)]
pub trait AgentProcess: Send {
    fn take_stdout(&mut self) -> Box<dyn Read + Send>;
    fn take_stderr(&mut self) -> Box<dyn Read + Send>;
    fn wait(&mut self) -> i32;
}

#[cfg_attr(test, mockall::automock(type Process = MockAgentProcess;))]
pub trait AgentTransport: Send + Sync {
    type Process: AgentProcess;

    /// Blocking mode: run `argv` as root in `qube`, wait, return
    /// sanitised captured output.
    fn run_with_args(&self, qube: &str, argv: &[String]) -> ProcessResult;

    /// Streaming mode: run `argv` as root in `qube` via the exec service,
    /// returning a process handle for live progress consumption.
    fn run_service(&self, qube: &str, argv: &[String]) -> std::io::Result<Self::Process>;
}

/// Runs commands directly on the local host with no RPC hop, used both
/// for the AdminVM special case and for integration tests.
pub struct LocalProcessTransport;

pub struct LocalAgentProcess {
    child: std::process::Child,
}

impl AgentProcess for LocalAgentProcess {
    fn take_stdout(&mut self) -> Box<dyn Read + Send> {
        Box::new(self.child.stdout.take().expect("stdout was piped"))
    }

    fn take_stderr(&mut self) -> Box<dyn Read + Send> {
        Box::new(self.child.stderr.take().expect("stderr was piped"))
    }

    fn wait(&mut self) -> i32 {
        self.child.wait().ok().and_then(|s| s.code()).unwrap_or(1)
    }
}

impl AgentTransport for LocalProcessTransport {
    type Process = LocalAgentProcess;

    fn run_with_args(&self, _qube: &str, argv: &[String]) -> ProcessResult {
        let output = match Command::new(&argv[0]).args(&argv[1..]).output() {
            Ok(out) => out,
            Err(e) => {
                return ProcessResult::new(ExitCode::ErrQrexec, "", format!("exec failed: {e}"))
            }
        };
        let code = ExitCode::from_raw(output.status.code().unwrap_or(1)).unwrap_or(ExitCode::Err);
        ProcessResult::from_streams(code, &output.stdout, &output.stderr)
    }

    fn run_service(&self, _qube: &str, argv: &[String]) -> std::io::Result<Self::Process> {
        let child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        Ok(LocalAgentProcess { child })
    }
}
