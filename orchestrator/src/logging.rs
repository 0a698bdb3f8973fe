//! Orchestrator-side logging: the fleet-wide log file plus a TTY-friendly
//! stderr layer, mirroring the agent's journald/stdout split
//! ([`qubes_update_agent`]'s `logging` module) but always also writing to
//! `/var/log/qubes/qubes-vm-update.log`.

use std::io::IsTerminal;
use std::path::Path;

use eyre::WrapErr;
use tracing::warn;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::Layer;

const SYSLOG_IDENTIFIER: &str = "qubes-vm-update";

fn filter(level: &str) -> EnvFilter {
    let default = level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    EnvFilter::builder().with_default_directive(default.into()).from_env_lossy()
}

fn try_init_fleet_log(path: &Path, truncate: bool, level: &str) -> eyre::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).wrap_err("failed to create fleet log directory")?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(!truncate)
        .truncate(truncate)
        .open(path)
        .wrap_err("failed to open fleet log file")?;

    let file_log = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .with_filter(filter(level));

    let istty = std::io::stderr().is_terminal();
    if istty {
        let stderr_log = tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(filter(level));
        tracing_subscriber::registry().with(file_log).with(stderr_log).try_init()?;
    } else {
        let journal = tracing_journald::layer()
            .wrap_err("failed to initialize journald logger")?
            .with_syslog_identifier(SYSLOG_IDENTIFIER.to_owned())
            .with_filter(filter(level));
        tracing_subscriber::registry().with(file_log).with(journal).try_init()?;
    }
    Ok(())
}

pub fn init(fleet_log_path: &Path, truncate: bool, level: &str) {
    if let Err(e) = try_init_fleet_log(fleet_log_path, truncate, level) {
        warn!("failed to initialize fleet log at {}: {e}", fleet_log_path.display());
    }
}
