#![forbid(unsafe_code)]
#![warn(unreachable_pub)]

pub mod agent_core;
pub mod drivers;
pub mod logging;
pub mod os_release;
pub mod plugins;
pub mod settings;

use qubes_build_info::{make_build_info, BuildInfo};

pub const BUILD_INFO: BuildInfo = make_build_info!();
