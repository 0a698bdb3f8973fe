//! Distro-agnostic flatpak update pass, grounded on `flatpak_updater.py`.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use tracing::info;

use crate::os_release::OsData;

pub fn flatpak_updater(_os_data: &OsData, _requirements: &mut BTreeMap<String, String>) {
    if !Path::new("/usr/bin/flatpak").exists() {
        return;
    }
    info!("flatpak is installed, checking for flatpak updates");
    let has_updates = Command::new("flatpak")
        .args(["remote-ls", "--system", "--updates"])
        .output()
        .map(|out| !out.stdout.is_empty())
        .unwrap_or(false);
    if !has_updates {
        info!("no flatpak updates found");
        return;
    }
    info!("flatpak updates found, updating flatpaks");
    let _ = Command::new("flatpak")
        .args(["update", "--system", "--noninteractive", "-y"])
        .status();
}
