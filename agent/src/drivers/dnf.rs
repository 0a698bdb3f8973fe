//! RedHat-family driver (dnf, falling back to dnf5/yum), grounded on
//! `dnf_cli.py`/`DNFCLI`.

use qubes_update_core::{ExitCode, PackageSet, ProcessResult};

use super::cli_util::run_cmd;
use super::{Driver, DriverError};

pub struct DnfDriver {
    binary: String,
}

impl DnfDriver {
    /// Probe `dnf5` first, then
    /// `dnf`, then `yum`.
    pub fn detect() -> Result<Self, DriverError> {
        for candidate in ["dnf5", "dnf", "yum"] {
            if which(candidate) {
                return Ok(Self {
                    binary: candidate.to_string(),
                });
            }
        }
        Err(DriverError::BinaryNotFound)
    }
}

fn which(binary: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join(binary).is_file())
        })
        .unwrap_or(false)
}

impl Driver for DnfDriver {
    fn name(&self) -> &'static str {
        "dnf"
    }

    fn binary(&self) -> &str {
        &self.binary
    }

    fn refresh(&self, hard_fail: bool) -> ProcessResult {
        let mut result = run_cmd(&[&self.binary, "-q", "clean", "expire-cache"], false);

        let skip_flag = format!("--setopt=skip_if_unavailable={}", i32::from(!hard_fail));
        let check = run_cmd(&[&self.binary, "-q", "check-update", &skip_flag], false);
        // dnf's check-update returns 100 when updates are available;
        // that is not an error, so normalize before combining.
        let mut check = check;
        if check.code == ExitCode::OkNoUpdates {
            check.code = ExitCode::Ok;
        }
        result.add(check);

        if result
            .out
            .lines()
            .chain(result.err.lines())
            .any(|l| l.starts_with("Error:"))
        {
            result.code = result.code.combine(ExitCode::Err);
        }
        result
    }

    fn get_packages(&self) -> PackageSet {
        let result = run_cmd(
            &["rpm", "-qa", "--queryformat", "%{NAME} %{VERSION}%{RELEASE}\n"],
            false,
        );
        let mut packages = PackageSet::new();
        for line in result.out.lines() {
            if let Some((name, version)) = line.split_once(' ') {
                packages.insert(name, version);
            }
        }
        packages
    }

    fn get_action(&self, remove_obsolete: bool) -> Vec<String> {
        if remove_obsolete {
            vec!["--obsoletes".into(), "upgrade".into()]
        } else {
            let verb = if self.binary == "yum" { "update" } else { "upgrade" };
            vec!["--setopt=obsoletes=0".into(), verb.into()]
        }
    }

    fn clean(&self) -> ExitCode {
        if run_cmd(&[&self.binary, "-q", "clean", "all"], false).is_err() {
            ExitCode::ErrVmCleanup
        } else {
            ExitCode::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obsoletes_flag_is_set_when_removing_obsolete() {
        let d = DnfDriver { binary: "dnf".into() };
        assert_eq!(d.get_action(true), vec!["--obsoletes".to_string(), "upgrade".to_string()]);
    }

    #[test]
    fn yum_binary_uses_update_verb() {
        let d = DnfDriver { binary: "yum".into() };
        assert_eq!(
            d.get_action(false),
            vec!["--setopt=obsoletes=0".to_string(), "update".to_string()]
        );
    }
}
