//! Pre-driver config hooks, run in a fixed order before driver dispatch,
//! with an explicit registered list so no hook runs implicitly.

mod apt_keep_old_conffiles;
mod bookworm_backports;
mod fix_meminfo_writer_label;
mod flatpak_updater;
mod manage_rpm_macro;
mod pipewire_archlinux;
mod updatesproxy_fix;

use std::collections::BTreeMap;

use crate::os_release::OsData;

/// A pure-ish config hook: `(os_data, requirements) -> ()`, with side
/// effects allowed on host/guest config files.
pub type PluginFn = fn(&OsData, &mut BTreeMap<String, String>);

/// Run in this fixed order; a hook may rely on an earlier one's effects.
pub const PLUGINS: &[PluginFn] = &[
    apt_keep_old_conffiles::apt_keep_old_conffiles,
    bookworm_backports::bookworm_backports,
    fix_meminfo_writer_label::fix_meminfo_writer_label,
    manage_rpm_macro::manage_rpm_macro,
    updatesproxy_fix::updatesproxy_fix,
    flatpak_updater::flatpak_updater,
    pipewire_archlinux::pipewire_archlinux,
];

pub fn run_all(os_data: &OsData, requirements: &mut BTreeMap<String, String>) {
    for plugin in PLUGINS {
        plugin(os_data, requirements);
    }
}
