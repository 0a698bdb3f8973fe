//! Agent core: drive the selected driver, enforce the exit-code
//! taxonomy, emit the changes summary.

use std::collections::BTreeMap;

use qubes_update_core::{ExitCode, PackageSet, ProcessResult};
use tracing::{error, info, warn};

use crate::drivers::Driver;
use crate::os_release::OsData;
use crate::plugins;
use crate::settings::Args;

/// Applies the environment handoff before any driver call:
/// `DEBIAN_FRONTEND=noninteractive` on Debian, proxy env vars when the
/// updates-proxy sentinel file is present.
pub fn apply_environment_handoff(os_data: &OsData) {
    if os_data.family() == crate::os_release::OsFamily::Debian {
        std::env::set_var("DEBIAN_FRONTEND", "noninteractive");
    }
    if std::path::Path::new("/etc/qubes/updates-proxy-enabled").exists() {
        const PROXY_URL: &str = "http://127.0.0.1:8082/";
        std::env::set_var("http_proxy", PROXY_URL);
        std::env::set_var("https_proxy", PROXY_URL);
    }
}

/// The full `upgrade()` state machine. Never
/// propagates a Rust error; its return value IS the wire contract.
pub fn upgrade(driver: &dyn Driver, args: &Args, os_data: &OsData) -> ExitCode {
    let mut requirements: BTreeMap<String, String> = BTreeMap::new();
    plugins::run_all(os_data, &mut requirements);

    if args.download_only && !driver.supports_download_only() {
        error!(
            "driver {:?} has no distinct download phase; --download-only is unsupported",
            driver.name()
        );
        return ExitCode::ErrUsage;
    }

    let mut result = ProcessResult::realtime(ExitCode::Ok, "", "");
    let current = driver.get_packages();

    // 1. install requirements
    if !requirements.is_empty() {
        println!("Install requirements");
        let mut r = driver.install_requirements(&requirements, &current);
        if r.is_err() {
            warn!("installing requirements failed with exit code {}", r.code.code());
            r.code = ExitCode::ErrVmPre;
        }
        result.add(r);
        if result.is_err() && args.hard_fail() {
            error!("exiting due to a packages install error; use --force-upgrade to upgrade anyway");
            return finalize(result, &current, &current, args);
        }
    }

    // 2. refresh
    if !args.no_refresh {
        println!("Refreshing package info");
        let mut r = driver.refresh(args.hard_fail());
        if r.is_err() {
            warn!("refreshing failed with code {}", r.code.code());
            r.code = ExitCode::ErrVmRefresh;
        }
        result.add(r);
        if result.is_err() && args.hard_fail() {
            error!("exiting due to a refresh error; use --force-upgrade to upgrade anyway");
            return finalize(result, &current, &current, args);
        }
    }

    if args.download_only {
        return finalize(result, &current, &current, args);
    }

    // 3. upgrade
    let mut r = driver.upgrade_internal(args.remove_obsolete());
    if r.is_err() {
        r.code = ExitCode::ErrVmUpdate;
    }
    result.add(r);

    let new = driver.get_packages();

    // 4. cleanup
    if !args.no_cleanup {
        let clean_code = driver.clean();
        if clean_code != ExitCode::Ok {
            result.add(ProcessResult::new(ExitCode::ErrVmCleanup, "", ""));
        }
    }

    finalize(result, &current, &new, args)
}

fn finalize(mut result: ProcessResult, old: &PackageSet, new: &PackageSet, args: &Args) -> ExitCode {
    let diff = old.diff(new);
    if !args.quiet {
        print!("{}", diff.summary());
    }

    let mut summary_result = ProcessResult::new(ExitCode::Ok, diff.summary(), "");
    summary_result.error_from_messages();
    if summary_result.is_err() {
        summary_result.code = ExitCode::ErrVm;
    }
    result.add(ProcessResult::new(summary_result.code, "", ""));

    if !result.is_err() && diff.has_no_new_content() {
        result.code = ExitCode::OkNoUpdates;
    }

    if args.show_output && (!result.out.is_empty() || !result.err.is_empty()) {
        if !result.out.is_empty() {
            println!("{}", result.out);
        }
        if !result.err.is_empty() {
            eprintln!("{}", result.err);
        }
    }

    let final_code = if result.code.is_vm_handled() {
        result.code
    } else {
        info!("agent exit code {} outside the handled set", result.code.code());
        ExitCode::ErrVmUnhandled
    };
    final_code
}

#[cfg(test)]
mod tests {
    use super::*;
    use qubes_update_core::PackageSet;
    use std::cell::Cell;

    struct FakeDriver {
        refresh_code: Cell<ExitCode>,
        upgrade_code: Cell<ExitCode>,
        before: PackageSet,
        after: PackageSet,
    }

    impl Driver for FakeDriver {
        fn name(&self) -> &'static str {
            "fake"
        }
        fn binary(&self) -> &str {
            "true"
        }
        fn refresh(&self, _hard_fail: bool) -> ProcessResult {
            ProcessResult::new(self.refresh_code.get(), "", "")
        }
        fn get_packages(&self) -> PackageSet {
            if self.upgrade_code.get() == ExitCode::Ok && self.refresh_code.get() == ExitCode::Ok {
                self.after.clone()
            } else {
                self.before.clone()
            }
        }
        fn get_action(&self, _remove_obsolete: bool) -> Vec<String> {
            vec![]
        }
        fn install_requirements(
            &self,
            _requirements: &BTreeMap<String, String>,
            _current: &PackageSet,
        ) -> ProcessResult {
            ProcessResult::new(ExitCode::Ok, "", "")
        }
        fn upgrade_internal(&self, _remove_obsolete: bool) -> ProcessResult {
            ProcessResult::new(self.upgrade_code.get(), "", "")
        }
        fn clean(&self) -> ExitCode {
            ExitCode::Ok
        }
    }

    fn base_args() -> Args {
        Args {
            log: "info".into(),
            log_file: None,
            no_refresh: true,
            force_upgrade: false,
            leave_obsolete: false,
            no_progress: true,
            no_cleanup: true,
            download_only: false,
            show_output: false,
            quiet: true,
        }
    }

    fn empty_set() -> PackageSet {
        PackageSet::new()
    }

    fn one_pkg_set() -> PackageSet {
        let mut s = PackageSet::new();
        s.insert("a", "1.0");
        s
    }

    #[test]
    fn success_with_new_package_reports_ok() {
        let driver = FakeDriver {
            refresh_code: Cell::new(ExitCode::Ok),
            upgrade_code: Cell::new(ExitCode::Ok),
            before: empty_set(),
            after: one_pkg_set(),
        };
        let os_data = OsData::default();
        let code = upgrade(&driver, &base_args(), &os_data);
        assert_eq!(code, ExitCode::Ok);
    }

    #[test]
    fn no_changes_reports_no_updates() {
        let driver = FakeDriver {
            refresh_code: Cell::new(ExitCode::Ok),
            upgrade_code: Cell::new(ExitCode::Ok),
            before: one_pkg_set(),
            after: one_pkg_set(),
        };
        let os_data = OsData::default();
        let code = upgrade(&driver, &base_args(), &os_data);
        assert_eq!(code, ExitCode::OkNoUpdates);
    }

    #[test]
    fn upgrade_failure_maps_to_err_vm_update() {
        let driver = FakeDriver {
            refresh_code: Cell::new(ExitCode::Ok),
            upgrade_code: Cell::new(ExitCode::Err),
            before: empty_set(),
            after: empty_set(),
        };
        let os_data = OsData::default();
        let code = upgrade(&driver, &base_args(), &os_data);
        assert_eq!(code, ExitCode::ErrVmUpdate);
    }

    #[test]
    fn hard_fail_refresh_error_short_circuits() {
        let mut args = base_args();
        args.no_refresh = false;
        let driver = FakeDriver {
            refresh_code: Cell::new(ExitCode::Err),
            upgrade_code: Cell::new(ExitCode::Ok),
            before: empty_set(),
            after: one_pkg_set(),
        };
        let os_data = OsData::default();
        let code = upgrade(&driver, &args, &os_data);
        assert_eq!(code, ExitCode::ErrVmRefresh);
    }

    #[test]
    fn download_only_rejected_for_unsupporting_driver() {
        let mut args = base_args();
        args.download_only = true;
        let driver = FakeDriver {
            refresh_code: Cell::new(ExitCode::Ok),
            upgrade_code: Cell::new(ExitCode::Ok),
            before: empty_set(),
            after: empty_set(),
        };
        let os_data = OsData::default();
        let code = upgrade(&driver, &args, &os_data);
        assert_eq!(code, ExitCode::ErrUsage);
    }
}
