//! Target selector: preselect, then filter by update mode.
//! Grounded on spec.md §4.8 directly (the "stale iff checked today" Open
//! Question is resolved in spec.md itself) and `vmupdate.py`'s older
//! `get_targets` for the general preselect/filter shape.

use std::collections::HashSet;

use qubes_update_core::ExitCode;

use crate::qube::{QubeArena, QubeClass, QubeId};
use crate::settings::UpdateMode;

#[derive(Debug)]
pub struct SelectorError {
    pub code: ExitCode,
    pub message: String,
}

impl SelectorError {
    fn usage(message: impl Into<String>) -> Self {
        Self { code: ExitCode::ErrUsage, message: message.into() }
    }
}

pub struct SelectorInput<'a> {
    pub templates: bool,
    pub standalones: bool,
    pub apps: bool,
    pub all: bool,
    pub targets: &'a [String],
    pub skip: &'a [String],
}

/// Builds the preselected set (steps 1-5) before the update-mode
/// filter is applied.
pub fn preselect(arena: &QubeArena, input: &SelectorInput) -> Result<Vec<QubeId>, SelectorError> {
    let explicit_targets = !input.targets.is_empty();
    let mut seen = HashSet::new();
    for name in input.targets {
        if !seen.insert(name.as_str()) {
            return Err(SelectorError::usage(format!("duplicate target: {name}")));
        }
    }

    let mut selected: HashSet<QubeId> = HashSet::new();

    let no_class_flags = !(input.templates || input.standalones || input.apps || input.all);
    if no_class_flags && !explicit_targets {
        for (id, qube) in arena.iter() {
            if !qube.updateable || qube.class == QubeClass::AdminVm {
                continue;
            }
            if matches!(qube.class, QubeClass::AppVm | QubeClass::DispVm) && !qube.is_running {
                continue;
            }
            selected.insert(id);
        }
    }

    for (id, qube) in arena.iter() {
        let matches_class = (input.all && qube.class != QubeClass::AdminVm)
            || (input.templates && qube.class == QubeClass::TemplateVm)
            || (input.standalones && qube.class == QubeClass::StandaloneVm)
            || (input.apps && matches!(qube.class, QubeClass::AppVm | QubeClass::DispVm));
        if matches_class {
            selected.insert(id);
        }
    }

    for name in input.targets {
        match arena.id_of(name) {
            Some(id) => {
                selected.insert(id);
            }
            None => return Err(SelectorError::usage(format!("unknown target: {name}"))),
        }
    }

    for name in input.skip {
        if let Some(id) = arena.id_of(name) {
            selected.remove(&id);
        }
    }

    if !explicit_targets {
        selected.retain(|&id| !arena.get(id).feature_bool("skip-update"));
    }

    let mut out: Vec<QubeId> = selected.into_iter().collect();
    out.sort_unstable();
    Ok(out)
}

/// Today's date as an ISO-8601 `YYYY-MM-DD` string, computed from a days-
/// since-epoch value so callers (and tests) control "now" explicitly
/// instead of this module reaching for a wall-clock read.
fn days_since_epoch(now: std::time::SystemTime) -> i64 {
    now.duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as i64 / 86400).unwrap_or(0)
}

fn parse_iso_date_days(date: &str) -> Option<i64> {
    let (y, rest) = date.split_once('-')?;
    let (m, d) = rest.split_once('-')?;
    let (y, m, d) = (y.parse::<i64>().ok()?, m.parse::<i64>().ok()?, d.parse::<i64>().ok()?);
    // Civil-to-days algorithm (Howard Hinnant's `days_from_civil`), good
    // enough for relative staleness comparison; no calendar library in
    // the dependency stack for this.
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    Some(era * 146097 + doe - 719468)
}

/// Filters `preselected` by the chosen update mode.
/// `now` pins the staleness clock; `dom0_now` is `days_since_epoch(now)`.
pub fn filter(arena: &QubeArena, preselected: &[QubeId], mode: UpdateMode, now: std::time::SystemTime) -> Vec<QubeId> {
    let today = days_since_epoch(now);
    preselected
        .iter()
        .copied()
        .filter(|&id| {
            let qube = arena.get(id);
            match mode {
                UpdateMode::ForceUpdate => true,
                UpdateMode::UpdateIfAvailable => qube.feature_bool("updates-available"),
                UpdateMode::UpdateIfStale(n) => {
                    if qube.feature_bool("updates-available") {
                        return true;
                    }
                    let qrexec = qube.feature_bool("qrexec");
                    let is_linux = qube.feature("os").map(|v| v.eq_ignore_ascii_case("linux")).unwrap_or(false);
                    if !(qrexec && is_linux) {
                        return false;
                    }
                    match arena.inherited_feature(id, "last-updates-check") {
                        None => true,
                        Some(ts) => match parse_iso_date_days(ts) {
                            None => true,
                            Some(checked) => today - checked > n as i64,
                        },
                    }
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::{Duration, UNIX_EPOCH};

    use crate::qube::QubeRecord;

    fn record(name: &str, class: QubeClass, updateable: bool, running: bool) -> QubeRecord {
        QubeRecord {
            name: name.to_string(),
            class,
            updateable,
            template_name: None,
            features: HashMap::new(),
            is_running: running,
            auto_cleanup: false,
            servicevm: false,
        }
    }

    fn empty_input() -> SelectorInput<'static> {
        SelectorInput { templates: false, standalones: false, apps: false, all: false, targets: &[], skip: &[] }
    }

    #[test]
    fn default_preselect_excludes_adminvm_and_stopped_app() {
        let arena = QubeArena::build(vec![
            record("dom0", QubeClass::AdminVm, true, true),
            record("tmpl", QubeClass::TemplateVm, true, true),
            record("stopped-app", QubeClass::AppVm, true, false),
            record("running-app", QubeClass::AppVm, true, true),
        ]);
        let selected = preselect(&arena, &empty_input()).unwrap();
        let names: Vec<&str> = selected.iter().map(|&id| arena.get(id).name.as_str()).collect();
        assert!(names.contains(&"tmpl"));
        assert!(names.contains(&"running-app"));
        assert!(!names.contains(&"stopped-app"));
        assert!(!names.contains(&"dom0"));
    }

    #[test]
    fn duplicate_explicit_target_is_usage_error() {
        let arena = QubeArena::build(vec![record("a", QubeClass::TemplateVm, true, true)]);
        let targets = vec!["a".to_string(), "a".to_string()];
        let input = SelectorInput { targets: &targets, ..empty_input() };
        let err = preselect(&arena, &input).unwrap_err();
        assert_eq!(err.code, ExitCode::ErrUsage);
    }

    #[test]
    fn unknown_explicit_target_is_usage_error() {
        let arena = QubeArena::build(vec![record("a", QubeClass::TemplateVm, true, true)]);
        let targets = vec!["ghost".to_string()];
        let input = SelectorInput { targets: &targets, ..empty_input() };
        assert_eq!(preselect(&arena, &input).unwrap_err().code, ExitCode::ErrUsage);
    }

    #[test]
    fn skip_update_feature_is_honoured_without_explicit_targets() {
        let mut skip_me = record("skip-me", QubeClass::TemplateVm, true, true);
        skip_me.features.insert("skip-update".into(), "1".into());
        let arena = QubeArena::build(vec![skip_me]);
        let selected = preselect(&arena, &empty_input()).unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn force_update_keeps_everything_preselected() {
        let arena = QubeArena::build(vec![record("a", QubeClass::TemplateVm, true, true)]);
        let ids = vec![arena.id_of("a").unwrap()];
        let filtered = filter(&arena, &ids, UpdateMode::ForceUpdate, UNIX_EPOCH);
        assert_eq!(filtered, ids);
    }

    #[test]
    fn update_if_available_requires_feature() {
        let mut a = record("a", QubeClass::TemplateVm, true, true);
        a.features.insert("updates-available".into(), "1".into());
        let b = record("b", QubeClass::TemplateVm, true, true);
        let arena = QubeArena::build(vec![a, b]);
        let ids: Vec<_> = arena.ids().collect();
        let filtered = filter(&arena, &ids, UpdateMode::UpdateIfAvailable, UNIX_EPOCH);
        assert_eq!(filtered, vec![arena.id_of("a").unwrap()]);
    }

    #[test]
    fn update_if_stale_missing_timestamp_counts_as_always_stale() {
        let mut a = record("a", QubeClass::TemplateVm, true, true);
        a.features.insert("qrexec".into(), "1".into());
        a.features.insert("os".into(), "Linux".into());
        let arena = QubeArena::build(vec![a]);
        let ids: Vec<_> = arena.ids().collect();
        let filtered = filter(&arena, &ids, UpdateMode::UpdateIfStale(7), UNIX_EPOCH);
        assert_eq!(filtered, ids);
    }

    #[test]
    fn update_if_stale_recent_timestamp_excludes() {
        let mut a = record("a", QubeClass::TemplateVm, true, true);
        a.features.insert("qrexec".into(), "1".into());
        a.features.insert("os".into(), "Linux".into());
        a.features.insert("last-updates-check".into(), "1970-01-01".into());
        let arena = QubeArena::build(vec![a]);
        let ids: Vec<_> = arena.ids().collect();
        let now = UNIX_EPOCH + Duration::from_secs(3600);
        let filtered = filter(&arena, &ids, UpdateMode::UpdateIfStale(7), now);
        assert!(filtered.is_empty());
    }

    #[test]
    fn update_if_stale_old_timestamp_includes() {
        let mut a = record("a", QubeClass::TemplateVm, true, true);
        a.features.insert("qrexec".into(), "1".into());
        a.features.insert("os".into(), "Linux".into());
        a.features.insert("last-updates-check".into(), "1970-01-01".into());
        let arena = QubeArena::build(vec![a]);
        let ids: Vec<_> = arena.ids().collect();
        let now = UNIX_EPOCH + Duration::from_secs(10 * 86400);
        let filtered = filter(&arena, &ids, UpdateMode::UpdateIfStale(7), now);
        assert_eq!(filtered, ids);
    }
}
