//! NixOS driver (`qubes-nixos-rebuild` wrapper), grounded on
//! `nixos_cli.py`/`NIXOSCLI`.

use qubes_update_core::{ExitCode, PackageSet, ProcessResult};

use super::cli_util::run_cmd;
use super::Driver;

pub struct NixosDriver;

impl NixosDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NixosDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for NixosDriver {
    fn name(&self) -> &'static str {
        "nixos"
    }

    fn binary(&self) -> &str {
        "qubes-nixos-rebuild"
    }

    fn refresh(&self, _hard_fail: bool) -> ProcessResult {
        // no-op: the rebuild wrapper handles its own channel sync, and a
        // separate sync here could interfere with it (see original).
        run_cmd(&["true"], false)
    }

    fn get_packages(&self) -> PackageSet {
        let result = run_cmd(&["qubes-nixos-get-packages"], false);
        let mut packages = PackageSet::new();
        for line in result.out.lines() {
            let Some((name, info)) = line.split_once(':') else {
                continue;
            };
            let info = info.trim().trim_start_matches("∅ → ");
            for version in info.split(", ") {
                if !version.starts_with('+') {
                    packages.insert(name.trim(), version);
                }
            }
        }
        packages
    }

    fn get_action(&self, _remove_obsolete: bool) -> Vec<String> {
        // the rebuild wrapper handles obsoletions itself.
        Vec::new()
    }

    fn clean(&self) -> ExitCode {
        ExitCode::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_packages_parses_arrow_notation() {
        let line = "qubes-core-agent-linux: \u{2205} \u{2192} 4.3.5, +1413.6 KiB";
        let info = line.split_once(':').unwrap().1.trim().trim_start_matches("\u{2205} \u{2192} ");
        let versions: Vec<&str> = info.split(", ").filter(|v| !v.starts_with('+')).collect();
        assert_eq!(versions, vec!["4.3.5"]);
    }
}
