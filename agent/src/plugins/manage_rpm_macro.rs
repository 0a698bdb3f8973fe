//! Prepare RPM macro requirements depending on the Fedora release,
//! grounded on `manage_rpm_macro.py`.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use crate::os_release::{OsData, OsFamily};

const RPM_MACRO: &str = "/usr/lib/rpm/macros.d/macros.qubes";

pub fn manage_rpm_macro(os_data: &OsData, requirements: &mut BTreeMap<String, String>) {
    if os_data.family() != OsFamily::RedHat {
        return;
    }
    let old_fedora = os_data.id == "fedora" && fedora_release_below_33(&os_data.version_id);
    if old_fedora {
        info!("old fedora version detected");
        // CVE-2021-20271 mitigation.
        if let Err(e) = std::fs::write(RPM_MACRO, "%_pkgverify_level all") {
            warn!("failed to write {RPM_MACRO}: {e}");
        }
    } else {
        if Path::new(RPM_MACRO).exists() {
            let _ = std::fs::remove_file(RPM_MACRO);
        }
        requirements.insert("dnf".to_string(), "4.7.0".to_string());
        requirements.insert("rpm".to_string(), "4.14.2".to_string());
    }
}

fn fedora_release_below_33(version_id: &str) -> bool {
    version_id.parse::<u32>().map(|v| v < 33).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_comparison() {
        assert!(fedora_release_below_33("32"));
        assert!(!fedora_release_below_33("41"));
        assert!(!fedora_release_below_33("not-a-number"));
    }
}
