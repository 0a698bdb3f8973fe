//! Deploy the qubes.UpdatesProxy socat fix, grounded on
//! `updatesproxy_fix.py`. https://github.com/QubesOS/qubes-issues/issues/9025

use std::collections::BTreeMap;
use std::path::Path;

use tracing::warn;

use crate::os_release::{OsData, OsFamily};

const RPC_FILENAME: &str = "/etc/qubes-rpc/qubes.UpdatesProxy";

pub fn updatesproxy_fix(os_data: &OsData, _requirements: &mut BTreeMap<String, String>) {
    if os_data.family() != OsFamily::RedHat {
        return;
    }
    let path = Path::new(RPC_FILENAME);
    // the file doesn't exist on templates without
    // qubes-core-agent-networking installed.
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    if content.contains("STDIO TCP:localhost:8082") {
        if let Err(e) = std::fs::write(path, "exec socat STDIO TCP4:127.0.0.1:8082\n") {
            warn!("failed to write {RPC_FILENAME}: {e}");
        }
    }
}
