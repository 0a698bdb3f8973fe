//! Agent-side logging: journald when launched non-interactively (the
//! normal case, spawned by the orchestrator over qrexec), a compact
//! stdout/stderr-split formatter on a TTY (manual invocation/debugging).

use std::io::IsTerminal;
use std::path::Path;

use eyre::WrapErr;
use tracing::warn;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::Layer;

const SYSLOG_IDENTIFIER: &str = "qubes-update-agent";

fn filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
}

fn try_init_journal() -> eyre::Result<()> {
    let journal = tracing_journald::layer()
        .wrap_err("failed to initialize journald logger")?
        .with_syslog_identifier(SYSLOG_IDENTIFIER.to_owned())
        .with_filter(filter());
    tracing_subscriber::registry().with(journal).try_init()?;
    Ok(())
}

fn try_init_stdout_logger() -> eyre::Result<()> {
    let stdout_log = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stdout)
        .with_filter(filter());
    tracing_subscriber::registry().with(stdout_log).try_init()?;
    Ok(())
}

/// Also append every line to the per-qube agent log file named in spec
/// §6 (`/var/log/qubes/qubes-update/update-agent.log`).
fn try_init_file_logger(path: &Path) -> eyre::Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .wrap_err("failed to open agent log file")?;
    let file_log = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .with_filter(filter());
    tracing_subscriber::registry().with(file_log).try_init()?;
    Ok(())
}

pub fn init(log_path: Option<&Path>) {
    if let Some(path) = log_path {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = try_init_file_logger(path) {
            warn!("failed to initialize agent log file: {e}");
        }
        return;
    }

    let mut err = None;
    let istty = std::io::stdin().is_terminal();
    if !istty {
        err = try_init_journal().err();
    }
    if istty || err.is_some() {
        err = try_init_stdout_logger().err();
    }
    if let Some(e) = err {
        warn!("failed to initialize journald logger: {e}");
    }
}
