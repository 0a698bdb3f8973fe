//! Unattended pulseaudio -> pipewire-pulse migration workaround on Arch,
//! grounded on `pipewire_archlinux.py`.

use std::collections::BTreeMap;
use std::process::{Command, Stdio};

use tracing::info;

use crate::os_release::{OsData, OsFamily};

pub fn pipewire_archlinux(os_data: &OsData, _requirements: &mut BTreeMap<String, String>) {
    if os_data.family() != OsFamily::ArchLinux {
        return;
    }
    let pulseaudio_installed = Command::new("pacman")
        .args(["-Q", "pulseaudio"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    if !pulseaudio_installed {
        return;
    }

    let update_list = match Command::new("pacman").args(["-Syup"]).output() {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).into_owned(),
        _ => return,
    };
    if !update_list.lines().any(|l| l.contains("/pipewire-pulse-")) {
        return;
    }

    info!("removing pulseaudio to allow clean migration to pipewire-pulse");
    let _ = Command::new("pacman")
        .args(["-Rdd", "--noconfirm", "pulseaudio"])
        .status();
}
