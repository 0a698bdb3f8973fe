//! Fix meminfo-writer's SELinux label so memory ballooning keeps working,
//! grounded on `fix_meminfo_writer_label.py`.
//! https://github.com/QubesOS/qubes-issues/issues/9663

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{error, info};

use crate::os_release::OsData;

const EXPECTED_LABEL: &str = "qubes_meminfo_writer_exec_t";

pub fn fix_meminfo_writer_label(os_data: &OsData, _requirements: &mut BTreeMap<String, String>) {
    if os_data.id != "fedora" || !Path::new("/usr/sbin/selinuxenabled").exists() {
        return;
    }
    let meminfo_path = if Path::new("/usr/bin/meminfo-writer").exists() {
        "/usr/bin/meminfo-writer"
    } else {
        "/usr/sbin/meminfo-writer"
    };

    let enabled = Command::new("/usr/sbin/selinuxenabled")
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    if !enabled {
        return;
    }

    let mut label_changed = false;
    match Command::new("ls").args(["-Z", meminfo_path]).output() {
        Ok(out) if out.status.success() => {
            let listing = String::from_utf8_lossy(&out.stdout);
            if !listing.contains(EXPECTED_LABEL) {
                match Command::new("chcon")
                    .args(["-t", EXPECTED_LABEL, meminfo_path])
                    .status()
                {
                    Ok(s) if s.success() => {
                        info!("SELinux label for {meminfo_path} changed to '{EXPECTED_LABEL}'");
                        label_changed = true;
                    }
                    _ => error!("failed to chcon {meminfo_path}"),
                }
            }
            // disable SELinux for the duration of the update to avoid a
            // half-updated policy interrupting the process.
            let _ = Command::new("setenforce").arg("0").status();
        }
        _ => error!("error processing {meminfo_path}"),
    }

    if label_changed {
        match std::fs::read_to_string("/run/meminfo-writer.pid")
            .ok()
            .and_then(|s| s.trim().parse::<i32>().ok())
        {
            Some(pid) => {
                if signal::kill(Pid::from_raw(pid), Signal::SIGUSR1).is_ok() {
                    info!("USR1 signal sent to meminfo-writer process id: {pid}");
                } else {
                    error!("error sending USR1 signal to meminfo-writer process {pid}");
                }
            }
            None => error!("error reading meminfo-writer pid file"),
        }
    }
}
