//! Concrete dom0 adapters for [`QubesApi`] and [`AgentTransport`], shelling
//! out to the real Qubes toolstack CLI (`qvm-ls`, `qvm-features`,
//! `qvm-start`, `qvm-shutdown`, `qvm-run`, `qrexec-client-vm`) rather than
//! binding `qubesadmin` directly — no Rust bindings for the admin API exist
//! in this dependency stack, the same CLI-only resolution already taken for
//! the package-manager drivers in the agent crate.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::process::{Command, Output, Stdio};

use qubes_update_core::{ExitCode, ProcessResult};

use crate::qube::{QubeClass, QubeRecord};
use crate::qube_api::QubesApi;
use crate::transport::{AgentProcess, AgentTransport};

pub struct QrexecQubesApi;

impl QrexecQubesApi {
    pub fn new() -> Self {
        Self
    }
}

impl Default for QrexecQubesApi {
    fn default() -> Self {
        Self::new()
    }
}

fn run(argv: &[&str]) -> std::io::Result<Output> {
    Command::new(argv[0]).args(&argv[1..]).output()
}

fn list_features(qube: &str) -> HashMap<String, String> {
    let output = match run(&["qvm-features", qube]) {
        Ok(o) if o.status.success() => o,
        _ => return HashMap::new(),
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.split_once(char::is_whitespace))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn bool_pref(qube: &str, prop: &str) -> bool {
    run(&["qvm-prefs", "--", qube, prop])
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn str_pref(qube: &str, prop: &str) -> Option<String> {
    let output = run(&["qvm-prefs", "--", qube, prop]).ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_class(klass: &str) -> Option<QubeClass> {
    Some(match klass {
        "AdminVM" => QubeClass::AdminVm,
        "TemplateVM" => QubeClass::TemplateVm,
        "StandaloneVM" => QubeClass::StandaloneVm,
        "AppVM" => QubeClass::AppVm,
        "DispVM" => QubeClass::DispVm,
        _ => return None,
    })
}

impl QubesApi for QrexecQubesApi {
    fn list_qubes(&self) -> Vec<QubeRecord> {
        let output = match run(&["qvm-ls", "--raw-data", "-O", "NAME,KLASS,STATE"]) {
            Ok(o) => o,
            Err(_) => return Vec::new(),
        };
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| {
                let cols: Vec<&str> = line.split('|').collect();
                let (name, klass, state) = (*cols.first()?, *cols.get(1)?, *cols.get(2)?);
                let class = parse_class(klass)?;
                let features = list_features(name);
                Some(QubeRecord {
                    name: name.to_string(),
                    class,
                    updateable: bool_pref(name, "updateable"),
                    template_name: str_pref(name, "template"),
                    features,
                    is_running: state.eq_ignore_ascii_case("running"),
                    auto_cleanup: bool_pref(name, "auto_cleanup"),
                    servicevm: bool_pref(name, "provides_network"),
                })
            })
            .collect()
    }

    fn dom0_update_if_stale_feature(&self) -> Option<u32> {
        let output = run(&["qvm-features", "dom0", "qubes-vm-update-update-if-stale"]).ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout).trim().parse().ok()
    }

    fn is_running(&self, qube: &str) -> bool {
        run(&["qvm-check", "--running", qube]).map(|o| o.status.success()).unwrap_or(false)
    }

    fn shutdown_single(&self, qube: &str) -> bool {
        run(&["qvm-shutdown", "--wait", qube]).map(|o| o.status.success()).unwrap_or(false)
    }

    fn shutdown_and_wait(&self, qubes: &[String]) -> bool {
        if qubes.is_empty() {
            return true;
        }
        let mut argv = vec!["qvm-shutdown".to_string(), "--wait".to_string()];
        argv.extend(qubes.iter().cloned());
        let argv_refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        run(&argv_refs).map(|o| o.status.success()).unwrap_or(false)
    }

    fn start(&self, qube: &str) -> bool {
        run(&["qvm-start", qube]).map(|o| o.status.success()).unwrap_or(false)
    }
}

/// Joins `argv` into a single shell command string, the shape both
/// `qvm-run` and `qubes.VMShell` expect as their final positional/stdin
/// argument.
fn shell_join(argv: &[String]) -> String {
    argv.iter().map(|a| shell_quote(a)).collect::<Vec<_>>().join(" ")
}

fn shell_quote(arg: &str) -> String {
    if !arg.is_empty() && arg.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:=".contains(c)) {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

pub struct QrexecTransport;

pub struct QrexecAgentProcess {
    child: std::process::Child,
}

impl AgentProcess for QrexecAgentProcess {
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

impl AgentTransport for QrexecTransport {
    type Process = QrexecAgentProcess;

    fn run_with_args(&self, qube: &str, argv: &[String]) -> ProcessResult {
        let command = shell_join(argv);
        let output = match Command::new("qvm-run").args(["-p", "--no-gui", "-u", "root", qube, &command]).output() {
            Ok(o) => o,
            Err(e) => return ProcessResult::new(ExitCode::ErrQrexec, "", format!("qvm-run failed: {e}")),
        };
        let code = output.status.code().and_then(ExitCode::from_raw).unwrap_or(ExitCode::ErrQrexec);
        ProcessResult::from_streams(code, &output.stdout, &output.stderr)
    }

    fn run_service(&self, qube: &str, argv: &[String]) -> std::io::Result<Self::Process> {
        let command = shell_join(argv);
        let mut child = Command::new("qrexec-client-vm")
            .args([qube, "qubes.VMShell"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            writeln!(stdin, "{command}")?;
        }
        Ok(QrexecAgentProcess { child })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_leaves_plain_tokens_bare() {
        assert_eq!(shell_quote("--no-refresh"), "--no-refresh");
        assert_eq!(shell_quote("/run/qubes-update/agent/qubes-update-agent"), "/run/qubes-update/agent/qubes-update-agent");
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn shell_join_quotes_only_where_needed() {
        let argv = vec!["cat".to_string(), "a file".to_string()];
        assert_eq!(shell_join(&argv), "cat 'a file'");
    }
}
