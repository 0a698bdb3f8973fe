//! Arch Linux driver (`pacman` CLI), grounded on
//! `pacman_cli.py`/`PACMANCLI`.

use qubes_update_core::{ExitCode, PackageSet, ProcessResult};

use super::cli_util::run_cmd;
use super::Driver;

pub struct PacmanDriver;

impl PacmanDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PacmanDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for PacmanDriver {
    fn name(&self) -> &'static str {
        "pacman"
    }

    fn binary(&self) -> &str {
        "pacman"
    }

    fn refresh(&self, _hard_fail: bool) -> ProcessResult {
        run_cmd(&["pacman", "-Sy"], false)
    }

    fn get_packages(&self) -> PackageSet {
        let result = run_cmd(&["pacman", "-Q"], false);
        let mut packages = PackageSet::new();
        for line in result.out.lines() {
            if let Some((name, version)) = line.split_once(' ') {
                packages.insert(name, version);
            }
        }
        packages
    }

    fn get_action(&self, _remove_obsolete: bool) -> Vec<String> {
        // pacman handles obsoletions itself; there is no separate flag.
        vec!["-Syu".to_string(), "--noconfirm".to_string()]
    }

    fn clean(&self) -> ExitCode {
        if run_cmd(&["pacman", "-Sc", "--noconfirm"], false).is_err() {
            ExitCode::ErrVmCleanup
        } else {
            ExitCode::Ok
        }
    }
}
