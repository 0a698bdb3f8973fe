//! Agent CLI surface: the common `AgentArgs` flag set
//! (`OPTIONS`/`EXCLUSIVE_OPTIONS`) one-to-one.

use std::path::PathBuf;

use clap::Parser;

use crate::BUILD_INFO;

#[derive(Debug, Parser)]
#[command(author, version = BUILD_INFO.version)]
pub struct Args {
    /// Log level passed through to the tracing filter.
    #[arg(long, default_value = "info")]
    pub log: String,

    /// Path to the agent's own log file; defaults to the well-known
    /// per-qube path under `/var/log/qubes/qubes-update/`.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Skip the refresh/metadata-update step.
    #[arg(long)]
    pub no_refresh: bool,

    /// Continue past refresh/requirement-install failures instead of
    /// aborting (`hard_fail = false`).
    #[arg(long)]
    pub force_upgrade: bool,

    /// Keep obsolete packages instead of removing them during upgrade.
    #[arg(long)]
    pub leave_obsolete: bool,

    /// Suppress the numeric progress protocol on stderr.
    #[arg(long)]
    pub no_progress: bool,

    /// Skip the post-upgrade cache cleanup step.
    #[arg(long)]
    pub no_cleanup: bool,

    /// Only download updates; do not apply them. Rejected with
    /// `ErrUsage` by drivers with no distinct download phase.
    #[arg(long)]
    pub download_only: bool,

    /// Print the captured stdout/stderr to the real streams.
    #[arg(long, conflicts_with = "quiet")]
    pub show_output: bool,

    /// Suppress the changes summary on stdout.
    #[arg(long, conflicts_with = "show_output")]
    pub quiet: bool,
}

impl Args {
    pub fn hard_fail(&self) -> bool {
        !self.force_upgrade
    }

    pub fn remove_obsolete(&self) -> bool {
        !self.leave_obsolete
    }
}

/// Serializes `self` back into CLI flags, mirroring `AgentArgs.to_cli_args()`
/// — used by the orchestrator when invoking the remote entrypoint.
impl Args {
    pub fn to_cli_args(&self) -> Vec<String> {
        let mut out = vec!["--log".to_string(), self.log.clone()];
        if let Some(path) = &self.log_file {
            out.push("--log-file".to_string());
            out.push(path.display().to_string());
        }
        if self.no_refresh {
            out.push("--no-refresh".to_string());
        }
        if self.force_upgrade {
            out.push("--force-upgrade".to_string());
        }
        if self.leave_obsolete {
            out.push("--leave-obsolete".to_string());
        }
        if self.no_progress {
            out.push("--no-progress".to_string());
        }
        if self.no_cleanup {
            out.push("--no-cleanup".to_string());
        }
        if self.download_only {
            out.push("--download-only".to_string());
        }
        if self.show_output {
            out.push("--show-output".to_string());
        }
        if self.quiet {
            out.push("--quiet".to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_fail_defaults_true() {
        let args = Args::parse_from(["agent"]);
        assert!(args.hard_fail());
        assert!(args.remove_obsolete());
    }

    #[test]
    fn force_upgrade_disables_hard_fail() {
        let args = Args::parse_from(["agent", "--force-upgrade"]);
        assert!(!args.hard_fail());
    }

    #[test]
    fn to_cli_args_round_trips_flags() {
        let args = Args::parse_from(["agent", "--no-refresh", "--download-only"]);
        let cli = args.to_cli_args();
        assert!(cli.contains(&"--no-refresh".to_string()));
        assert!(cli.contains(&"--download-only".to_string()));
    }

    #[test]
    fn show_output_and_quiet_are_mutually_exclusive() {
        let result = Args::try_parse_from(["agent", "--show-output", "--quiet"]);
        assert!(result.is_err());
    }
}
