//! Always choose the default behavior for apt conffile conflicts,
//! grounded on `apt_keep_old_conffiles.py`.

use std::collections::BTreeMap;

use tracing::warn;

use crate::os_release::{OsData, OsFamily};

const APT_CONF: &str = "/etc/apt/apt.conf.d/01qubes-update";

pub fn apt_keep_old_conffiles(os_data: &OsData, _requirements: &mut BTreeMap<String, String>) {
    if os_data.family() != OsFamily::Debian {
        return;
    }
    let contents = "\nDpkg::Options {\n   \"--force-confdef\";\n   \"--force-confold\";\n}\n";
    if let Err(e) = std::fs::write(APT_CONF, contents) {
        warn!("failed to write {APT_CONF}: {e}");
    }
}
