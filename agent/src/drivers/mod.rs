//! Package-manager driver interface and the fixed sum of concrete
//! per-family implementations, dispatched through one enum.

mod apk;
mod apt;
pub mod cli_util;
mod dnf;
mod nixos;
mod pacman;

pub use apk::ApkDriver;
pub use apt::AptDriver;
pub use dnf::DnfDriver;
pub use nixos::NixosDriver;
pub use pacman::PacmanDriver;

use std::collections::BTreeMap;

use qubes_update_core::{ExitCode, PackageSet, ProcessResult};
use thiserror::Error;

use crate::os_release::OsFamily;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("unsupported OS family: {0:?}")]
    UnsupportedFamily(OsFamily),
    #[error("no known package manager binary found on PATH")]
    BinaryNotFound,
}

/// Every package-manager family driver satisfies this interface.
pub trait Driver {
    fn name(&self) -> &'static str;
    fn binary(&self) -> &str;

    fn refresh(&self, hard_fail: bool) -> ProcessResult;
    fn get_packages(&self) -> PackageSet;
    fn get_action(&self, remove_obsolete: bool) -> Vec<String>;

    /// Whether this driver can download updates without applying them.
    fn supports_download_only(&self) -> bool {
        false
    }

    /// Bring `requirements` to at least the given minimum version.
    /// Packages absent from `current` are installed at latest; present
    /// packages are skipped iff any installed version is already
    /// lexically ≥ the requirement.
    fn install_requirements(
        &self,
        requirements: &BTreeMap<String, String>,
        current: &PackageSet,
    ) -> ProcessResult {
        let mut to_install = Vec::new();
        let mut to_upgrade = Vec::new();
        for (pkg, min_version) in requirements {
            match current.versions(pkg) {
                None => to_install.push(pkg.clone()),
                Some(versions) => {
                    if !versions.iter().any(|v| v >= min_version) {
                        to_upgrade.push(pkg.clone());
                    }
                }
            }
        }

        let mut result = ProcessResult::realtime(ExitCode::Ok, "", "");
        if !to_install.is_empty() {
            let mut argv = vec![self.binary().to_string(), "-q".into(), "-y".into(), "install".into()];
            argv.extend(to_install);
            let argv_refs: Vec<&str> = argv.iter().map(String::as_str).collect();
            result.add(cli_util::run_cmd(&argv_refs, true));
        }
        if !to_upgrade.is_empty() {
            let mut argv = vec![self.binary().to_string(), "-q".into(), "-y".into()];
            argv.extend(self.get_action(false));
            argv.extend(to_upgrade);
            let argv_refs: Vec<&str> = argv.iter().map(String::as_str).collect();
            result.add(cli_util::run_cmd(&argv_refs, true));
        }
        result
    }

    /// Run the full upgrade via CLI.
    fn upgrade_internal(&self, remove_obsolete: bool) -> ProcessResult {
        let mut argv = vec![self.binary().to_string()];
        argv.extend(self.get_action(remove_obsolete));
        let argv_refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        cli_util::run_cmd(&argv_refs, true)
    }

    /// Clear package caches; `Ok` on success, `ErrVmCleanup` otherwise.
    fn clean(&self) -> ExitCode;
}

/// Fixed sum of the concrete driver implementations.
pub enum PackageManagerDriver {
    Apt(AptDriver),
    Dnf(DnfDriver),
    Pacman(PacmanDriver),
    Apk(ApkDriver),
    NixOs(NixosDriver),
}

macro_rules! dispatch {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            PackageManagerDriver::Apt(d) => d.$method($($arg),*),
            PackageManagerDriver::Dnf(d) => d.$method($($arg),*),
            PackageManagerDriver::Pacman(d) => d.$method($($arg),*),
            PackageManagerDriver::Apk(d) => d.$method($($arg),*),
            PackageManagerDriver::NixOs(d) => d.$method($($arg),*),
        }
    };
}

impl Driver for PackageManagerDriver {
    fn name(&self) -> &'static str {
        dispatch!(self, name)
    }

    fn binary(&self) -> &str {
        dispatch!(self, binary)
    }

    fn refresh(&self, hard_fail: bool) -> ProcessResult {
        dispatch!(self, refresh, hard_fail)
    }

    fn get_packages(&self) -> PackageSet {
        dispatch!(self, get_packages)
    }

    fn get_action(&self, remove_obsolete: bool) -> Vec<String> {
        dispatch!(self, get_action, remove_obsolete)
    }

    fn supports_download_only(&self) -> bool {
        dispatch!(self, supports_download_only)
    }

    fn install_requirements(
        &self,
        requirements: &BTreeMap<String, String>,
        current: &PackageSet,
    ) -> ProcessResult {
        dispatch!(self, install_requirements, requirements, current)
    }

    fn upgrade_internal(&self, remove_obsolete: bool) -> ProcessResult {
        dispatch!(self, upgrade_internal, remove_obsolete)
    }

    fn clean(&self) -> ExitCode {
        dispatch!(self, clean)
    }
}

/// Driver selection ladder, collapsed to CLI-only variants: no native
/// package-manager bindings are available, so every driver shells out.
pub fn detect(family: OsFamily) -> Result<PackageManagerDriver, DriverError> {
    match family {
        OsFamily::Debian => Ok(PackageManagerDriver::Apt(AptDriver::new())),
        OsFamily::RedHat | OsFamily::Qubes => {
            dnf::DnfDriver::detect().map(PackageManagerDriver::Dnf)
        }
        OsFamily::ArchLinux => Ok(PackageManagerDriver::Pacman(PacmanDriver::new())),
        OsFamily::Alpine => Ok(PackageManagerDriver::Apk(ApkDriver::new())),
        OsFamily::NixOs => Ok(PackageManagerDriver::NixOs(NixosDriver::new())),
        OsFamily::Other => Err(DriverError::UnsupportedFamily(family)),
    }
}
