//! Pull firmware packages from bookworm-backports, grounded on
//! `bookworm_backports.py`. https://github.com/QubesOS/qubes-issues/issues/9815

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use tracing::warn;

use crate::os_release::OsData;

const SOURCES_LIST: &str = "/etc/apt/sources.list.d/backports.list";
const BASE_REPO_URL: &str = "deb.debian.org/debian/dists/bookworm/InRelease";
const BASE_ONION_REPO_URL: &str =
    "2s4yqjx5ul6okpp3f2gaunr2syex5jgbfpfvhxxbbjwnrsvbk5v3qbid.onion/debian/dists/bookworm/InRelease";
const PREFS_PATH: &str = "/etc/apt/preferences.d/backports_pins";
const PREFS_FIRMWARE_DATA: &str = "Package: src:firmware-nonfree\nPin: release n=bookworm-backports\nPin-Priority: 600\n\n";

pub fn bookworm_backports(os_data: &OsData, _requirements: &mut BTreeMap<String, String>) {
    if os_data.version_codename != "bookworm" {
        return;
    }
    if !package_installed_outside_backports("firmware-linux-nonfree") {
        return;
    }
    add_backports_repo();
    if !Path::new(PREFS_PATH).exists() {
        if let Err(e) = std::fs::write(PREFS_PATH, PREFS_FIRMWARE_DATA) {
            warn!("failed to write {PREFS_PATH}: {e}");
        }
    }
}

fn package_installed_outside_backports(package: &str) -> bool {
    let output = match Command::new("dpkg").arg("-l").arg(package).output() {
        Ok(o) if o.status.success() => o,
        _ => return false,
    };
    !output.stdout.windows(3).any(|w| w == b"bpo")
}

fn add_backports_repo() {
    let output = match Command::new("apt-get")
        .args(["--print-uris", "update"])
        .output()
    {
        Ok(o) if o.status.success() => o,
        _ => return,
    };
    let text = String::from_utf8_lossy(&output.stdout);
    let mut base_url = None;
    let mut backports_enabled = false;
    for line in text.lines() {
        if base_url.is_none() && (line.contains(BASE_REPO_URL) || line.contains(BASE_ONION_REPO_URL)) {
            if let Some(url) = line.split_whitespace().next() {
                base_url = Some(
                    url.trim_matches('\'')
                        .replace("/dists/bookworm/InRelease", ""),
                );
            }
        }
        if line.contains("/debian/dists/bookworm-backports/") {
            backports_enabled = true;
        }
    }
    if let Some(base_url) = base_url {
        if !backports_enabled && !Path::new(SOURCES_LIST).exists() {
            let line = format!("deb {base_url} bookworm-backports main contrib non-free-firmware\n");
            if let Err(e) = std::fs::write(SOURCES_LIST, line) {
                warn!("failed to write {SOURCES_LIST}: {e}");
            }
        }
    }
}
