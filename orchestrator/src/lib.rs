#![forbid(unsafe_code)]
#![warn(unreachable_pub)]

pub mod apply;
pub mod logging;
pub mod progress_ui;
pub mod qube;
pub mod qube_api;
pub mod qube_connection;
pub mod qrexec;
pub mod scheduler;
pub mod selector;
pub mod settings;
pub mod transport;
pub mod update_agent_manager;

use qubes_build_info::{make_build_info, BuildInfo};

pub const BUILD_INFO: BuildInfo = make_build_info!();
