//! Post-update applier: template shutdown and derived-VM
//! restart/shutdown reconciliation. Grounded on `vmupdate.py`'s
//! `restart_app_vms`, lifted one layer since the actual shutdown/start
//! polling mechanics belong to the out-of-scope qube management API
//! ([`crate::qube_api::QubesApi`]).

use std::collections::HashSet;

use qubes_update_core::{ExitCode, FinalStatus};

use crate::qube::{QubeArena, QubeClass, QubeId};
use crate::qube_api::QubesApi;
use crate::settings::ApplyMode;

/// The set-algebra result of the post-update plan, before any qube API calls are made.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ApplyPlan {
    pub tmpls_to_shutdown: Vec<QubeId>,
    pub to_restart: Vec<QubeId>,
    pub to_shutdown: Vec<QubeId>,
}

/// Computes the plan from template/derived-VM statuses. Pure;
/// takes no qube API action.
pub fn plan(arena: &QubeArena, status: &std::collections::HashMap<QubeId, FinalStatus>) -> ApplyPlan {
    let tmpls_updated: Vec<QubeId> = arena
        .ids()
        .filter(|&id| arena.get(id).class == QubeClass::TemplateVm)
        .filter(|&id| status.get(&id) == Some(&FinalStatus::Success))
        .collect();

    let tmpls_to_shutdown: Vec<QubeId> =
        tmpls_updated.iter().copied().filter(|&id| arena.get(id).is_running).collect();

    let mut candidates: HashSet<QubeId> = HashSet::new();
    for &t in &tmpls_updated {
        candidates.extend(arena.get(t).derived_vms.iter().copied());
    }

    let eligible: HashSet<QubeId> = candidates
        .into_iter()
        .filter(|&v| status.get(&v) != Some(&FinalStatus::Success))
        .filter(|&v| arena.get(v).is_running)
        .filter(|&v| !(arena.get(v).class == QubeClass::DispVm && arena.get(v).auto_cleanup))
        .collect();

    let to_restart: Vec<QubeId> = eligible.iter().copied().filter(|&v| arena.get(v).servicevm).collect();
    let restart_set: HashSet<QubeId> = to_restart.iter().copied().collect();
    let to_shutdown: Vec<QubeId> = eligible.into_iter().filter(|v| !restart_set.contains(v)).collect();

    ApplyPlan { tmpls_to_shutdown, to_restart, to_shutdown }
}

/// Executes `plan` according to `mode` via `api`, returning the worst
/// exit code across any shutdown/start failures.
pub fn apply(arena: &QubeArena, plan: &ApplyPlan, mode: ApplyMode, api: &dyn QubesApi) -> ExitCode {
    if mode == ApplyMode::NoApply {
        return ExitCode::Ok;
    }

    let mut code = ExitCode::Ok;

    let tmpl_names: Vec<String> = plan.tmpls_to_shutdown.iter().map(|&id| arena.get(id).name.clone()).collect();
    let mut tmpl_shutdown_failed = false;
    if !tmpl_names.is_empty() && !api.shutdown_and_wait(&tmpl_names) {
        code = code.combine(ExitCode::ErrShutdownTmpl);
        tmpl_shutdown_failed = true;
    }

    // "If a template shutdown fails, its derived VMs are skipped (not
    // retried)" — conservatively skip the whole restart/shutdown pass.
    if tmpl_shutdown_failed {
        return code;
    }

    let restart_names: Vec<String> = plan.to_restart.iter().map(|&id| arena.get(id).name.clone()).collect();
    if !restart_names.is_empty() {
        if !api.shutdown_and_wait(&restart_names) {
            code = code.combine(ExitCode::ErrShutdownApp);
        } else {
            for name in &restart_names {
                if !api.start(name) {
                    code = code.combine(ExitCode::ErrStartApp);
                }
            }
        }
    }

    if mode == ApplyMode::ApplyToAll {
        let shutdown_names: Vec<String> = plan.to_shutdown.iter().map(|&id| arena.get(id).name.clone()).collect();
        if !shutdown_names.is_empty() && !api.shutdown_and_wait(&shutdown_names) {
            code = code.combine(ExitCode::ErrShutdownApp);
        }
    }

    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::qube::QubeRecord;
    use crate::qube_api::MockQubesApi;

    fn record(
        name: &str,
        class: QubeClass,
        template: Option<&str>,
        running: bool,
        auto_cleanup: bool,
        servicevm: bool,
    ) -> QubeRecord {
        QubeRecord {
            name: name.to_string(),
            class,
            updateable: true,
            template_name: template.map(str::to_string),
            features: HashMap::new(),
            is_running: running,
            auto_cleanup,
            servicevm,
        }
    }

    #[test]
    fn plan_excludes_auto_cleanup_dispvm_and_separates_restart_from_shutdown() {
        let arena = QubeArena::build(vec![
            record("tmpl", QubeClass::TemplateVm, None, true, false, false),
            record("app", QubeClass::AppVm, Some("tmpl"), true, false, false),
            record("svc", QubeClass::AppVm, Some("tmpl"), true, false, true),
            record("disp", QubeClass::DispVm, Some("tmpl"), true, true, false),
        ]);
        let mut status = HashMap::new();
        status.insert(arena.id_of("tmpl").unwrap(), FinalStatus::Success);
        status.insert(arena.id_of("app").unwrap(), FinalStatus::NoUpdates);
        status.insert(arena.id_of("svc").unwrap(), FinalStatus::NoUpdates);
        status.insert(arena.id_of("disp").unwrap(), FinalStatus::NoUpdates);

        let p = plan(&arena, &status);
        assert_eq!(p.tmpls_to_shutdown, vec![arena.id_of("tmpl").unwrap()]);
        assert_eq!(p.to_restart, vec![arena.id_of("svc").unwrap()]);
        assert_eq!(p.to_shutdown, vec![arena.id_of("app").unwrap()]);

        let restart: HashSet<_> = p.to_restart.iter().collect();
        let shutdown: HashSet<_> = p.to_shutdown.iter().collect();
        assert!(restart.is_disjoint(&shutdown));
    }

    #[test]
    fn no_apply_mode_skips_everything() {
        let arena = QubeArena::build(vec![record("tmpl", QubeClass::TemplateVm, None, true, false, false)]);
        let p = ApplyPlan { tmpls_to_shutdown: vec![0], ..Default::default() };
        let api = MockQubesApi::new();
        assert_eq!(apply(&arena, &p, ApplyMode::NoApply, &api), ExitCode::Ok);
    }

    #[test]
    fn template_shutdown_failure_short_circuits_with_err_shutdown_tmpl() {
        let arena = QubeArena::build(vec![
            record("tmpl", QubeClass::TemplateVm, None, true, false, false),
            record("app", QubeClass::AppVm, Some("tmpl"), true, false, false),
        ]);
        let mut api = MockQubesApi::new();
        api.expect_shutdown_and_wait().times(1).returning(|_| false);
        let p = ApplyPlan {
            tmpls_to_shutdown: vec![arena.id_of("tmpl").unwrap()],
            to_restart: vec![],
            to_shutdown: vec![arena.id_of("app").unwrap()],
        };
        assert_eq!(apply(&arena, &p, ApplyMode::ApplyToAll, &api), ExitCode::ErrShutdownTmpl);
    }

    #[test]
    fn restart_failure_to_start_yields_err_start_app() {
        let arena = QubeArena::build(vec![record("svc", QubeClass::AppVm, None, true, false, true)]);
        let mut api = MockQubesApi::new();
        api.expect_shutdown_and_wait().returning(|_| true);
        api.expect_start().returning(|_| false);
        let p = ApplyPlan { to_restart: vec![arena.id_of("svc").unwrap()], ..Default::default() };
        assert_eq!(apply(&arena, &p, ApplyMode::ApplyToSys, &api), ExitCode::ErrStartApp);
    }
}
