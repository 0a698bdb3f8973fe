use std::process::{ExitCode as StdExitCode, Termination};

use clap::Parser;
use qubes_update_agent::agent_core::{apply_environment_handoff, upgrade};
use qubes_update_agent::drivers::{self, Driver};
use qubes_update_agent::os_release::OsData;
use qubes_update_agent::settings::Args;
use qubes_update_agent::{logging, BUILD_INFO};
use tracing::error;

const DEFAULT_LOG_PATH: &str = "/var/log/qubes/qubes-update/update-agent.log";

fn main() -> StdExitCode {
    let args = Args::parse();
    let log_path = args
        .log_file
        .clone()
        .or_else(|| Some(std::path::PathBuf::from(DEFAULT_LOG_PATH)));
    logging::init(log_path.as_deref());

    tracing::info!(version = BUILD_INFO.version, git = BUILD_INFO.git.describe, "starting update agent");

    let os_data = match OsData::read() {
        Ok(data) => data,
        Err(e) => {
            error!("failed to read /etc/os-release: {e}");
            return qubes_update_core::ExitCode::ErrVmUnhandled.report();
        }
    };

    apply_environment_handoff(&os_data);

    let driver = match drivers::detect(os_data.family()) {
        Ok(driver) => driver,
        Err(e) => {
            error!("no usable package-manager driver: {e}");
            return qubes_update_core::ExitCode::ErrUsage.report();
        }
    };
    tracing::info!(driver = driver.name(), "selected package-manager driver");

    let code = upgrade(&driver, &args, &os_data);
    code.report()
}
