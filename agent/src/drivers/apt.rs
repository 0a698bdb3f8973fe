//! Debian/Ubuntu driver (`apt-get` CLI), grounded on
//! `apt_cli.py`/`APTCLI`.

use qubes_update_core::{ExitCode, PackageSet, ProcessResult};

use super::cli_util::run_cmd;
use super::Driver;

pub struct AptDriver;

impl AptDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AptDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for AptDriver {
    fn name(&self) -> &'static str {
        "apt"
    }

    fn binary(&self) -> &str {
        "apt-get"
    }

    fn refresh(&self, _hard_fail: bool) -> ProcessResult {
        let mut result = run_cmd(&["apt-get", "-q", "update"], false);
        // apt-get prints repo failures as lines starting "Err:" even on
        // exit code 0; promote those to a real failure so the outer
        // taxonomy can remap it to ERR_VM_REFRESH.
        if result.out.lines().any(|l| l.starts_with("Err:")) {
            result.code = result.code.combine(ExitCode::Err);
        }
        result
    }

    fn get_packages(&self) -> PackageSet {
        let result = run_cmd(
            &[
                "dpkg-query",
                "--showformat",
                "${Status} ${Package} ${Version}\n",
                "-W",
            ],
            false,
        );
        let mut packages = PackageSet::new();
        for line in result.out.lines() {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() != 5 {
                continue;
            }
            let (selection, _flag, status, package, version) =
                (cols[0], cols[1], cols[2], cols[3], cols[4]);
            if matches!(selection, "install" | "hold") && status == "installed" {
                packages.insert(package, version);
            }
        }
        packages
    }

    fn get_action(&self, remove_obsolete: bool) -> Vec<String> {
        vec![(if remove_obsolete { "dist-upgrade" } else { "upgrade" }).to_string()]
    }

    /// Runs the default CLI upgrade, then (when `remove_obsolete`) sweeps
    /// old `linux-image-*` kernels.
    fn upgrade_internal(&self, remove_obsolete: bool) -> ProcessResult {
        let mut argv = vec![self.binary().to_string()];
        argv.extend(self.get_action(remove_obsolete));
        let argv_refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        let mut result = run_cmd(&argv_refs, true);

        if remove_obsolete {
            result.add(remove_obsolete_kernels());
        }
        result
    }

    fn clean(&self) -> ExitCode {
        if run_cmd(&["apt-get", "-q", "-y", "autoclean"], false).is_err() {
            ExitCode::ErrVmCleanup
        } else {
            ExitCode::Ok
        }
    }
}

/// Remove obsolete `linux-image-*` kernels by parsing `autoremove -s`'s
/// dry-run output for `Remv ` lines.
pub fn remove_obsolete_kernels() -> ProcessResult {
    let dry_run = run_cmd(&["apt-get", "-q", "-s", "autoremove"], false);
    let to_remove: Vec<&str> = dry_run
        .out
        .lines()
        .filter_map(|line| line.strip_prefix("Remv "))
        .filter_map(|rest| rest.split_whitespace().next())
        .filter(|pkg| pkg.starts_with("linux-image"))
        .collect();
    if to_remove.is_empty() {
        return ProcessResult::new(ExitCode::Ok, "", "");
    }
    let mut argv = vec!["apt-get", "-q", "-y", "remove"];
    argv.extend(to_remove.iter().copied());
    run_cmd(&argv, true)
}
