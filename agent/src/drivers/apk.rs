//! Alpine driver (`apk` CLI). Not present in the retrieved original
//! sources; shaped identically to the other CLI drivers in this module
//! (refresh/get_packages/get_action split) using apk's standard verbs.

use qubes_update_core::{ExitCode, PackageSet, ProcessResult};

use super::cli_util::run_cmd;
use super::Driver;

pub struct ApkDriver;

impl ApkDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ApkDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for ApkDriver {
    fn name(&self) -> &'static str {
        "apk"
    }

    fn binary(&self) -> &str {
        "apk"
    }

    fn refresh(&self, _hard_fail: bool) -> ProcessResult {
        run_cmd(&["apk", "update"], false)
    }

    fn get_packages(&self) -> PackageSet {
        let result = run_cmd(&["apk", "info", "-v"], false);
        let mut packages = PackageSet::new();
        for line in result.out.lines() {
            // "pkgname-1.2.3-r0"; split the trailing "-<version>-r<rel>".
            if let Some(idx) = line.rfind('-').and_then(|dash| line[..dash].rfind('-')) {
                let (name, version) = line.split_at(idx);
                packages.insert(name, version.trim_start_matches('-'));
            }
        }
        packages
    }

    fn get_action(&self, _remove_obsolete: bool) -> Vec<String> {
        vec!["upgrade".to_string()]
    }

    fn clean(&self) -> ExitCode {
        if run_cmd(&["apk", "cache", "clean"], false).is_err() {
            ExitCode::ErrVmCleanup
        } else {
            ExitCode::Ok
        }
    }
}
