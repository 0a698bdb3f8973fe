use std::collections::HashMap;
use std::path::Path;
use std::process::{ExitCode as StdExitCode, Termination};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use clap::Parser;
use qubes_update_agent::settings::Args as AgentArgs;
use qubes_update_core::{ExitCode, FinalStatus};
use qubes_vm_update::apply;
use qubes_vm_update::logging;
use qubes_vm_update::progress_ui::{MultiBarUi, ProgressSink, SimpleTerminalBar};
use qubes_vm_update::qrexec::{QrexecQubesApi, QrexecTransport};
use qubes_vm_update::qube::{QubeArena, QubeClass, QubeId};
use qubes_vm_update::qube_api::QubesApi;
use qubes_vm_update::qube_connection::StatusUpdate;
use qubes_vm_update::scheduler::{self, TerminationFlag};
use qubes_vm_update::selector::{self, SelectorInput};
use qubes_vm_update::settings::{Args, ProgressMode};
use qubes_vm_update::transport::LocalProcessTransport;
use qubes_vm_update::update_agent_manager::{self, QubeLog, RunOutcome};
use qubes_vm_update::BUILD_INFO;

const FLEET_LOG_PATH: &str = "/var/log/qubes/qubes-vm-update.log";
const AGENT_PAYLOAD_DIR: &str = "/usr/lib/qubes/qubes-vm-update/agent";
/// The AdminVM already has the agent installed as a regular binary; no
/// transfer step is needed to reach it.
const ADMIN_VM_ENTRYPOINT: &str = "/usr/bin/qubes-update-agent";

fn main() -> StdExitCode {
    let args = Args::parse();
    logging::init(Path::new(FLEET_LOG_PATH), true, &args.log);
    tracing::info!(version = BUILD_INFO.version, git = BUILD_INFO.git.describe, "starting orchestrator");

    let api: Arc<dyn QubesApi> = Arc::new(QrexecQubesApi::new());
    run(&args, api).report()
}

fn run(args: &Args, api: Arc<dyn QubesApi>) -> ExitCode {
    let arena = QubeArena::build(api.list_qubes());

    let selector_input = SelectorInput {
        templates: args.templates,
        standalones: args.standalones,
        apps: args.apps,
        all: args.all,
        targets: &args.targets,
        skip: &args.skip,
    };

    let preselected = match selector::preselect(&arena, &selector_input) {
        Ok(ids) => ids,
        Err(err) => {
            eprintln!("{}", err.message);
            return err.code;
        }
    };

    let update_mode = args.update_mode(api.dom0_update_if_stale_feature());
    let selected = selector::filter(&arena, &preselected, update_mode, SystemTime::now());

    if args.dry_run {
        let names: Vec<&str> = selected.iter().map(|&id| arena.get(id).name.as_str()).collect();
        println!("Following qubes will be updated: {}", names.join(","));
        return ExitCode::Ok;
    }

    let (admin_ids, remote_ids): (Vec<QubeId>, Vec<QubeId>) =
        selected.iter().copied().partition(|&id| arena.get(id).class == QubeClass::AdminVm);

    let agent_cli_args = build_agent_cli_args(args);

    let (status_tx, status_rx) = flume::unbounded::<StatusUpdate>();

    let mut progress = build_progress_sink(args);
    for &id in admin_ids.iter().chain(remote_ids.iter()) {
        progress.add_qube(&arena.get(id).name);
    }

    let statuses_by_name: Arc<Mutex<HashMap<String, FinalStatus>>> = Arc::new(Mutex::new(HashMap::new()));
    let progress_statuses = Arc::clone(&statuses_by_name);
    let progress_handle = std::thread::spawn(move || {
        while let Ok(update) = status_rx.recv() {
            if let StatusUpdate::Done { qube, status } = &update {
                progress_statuses.lock().expect("progress status map poisoned").insert(qube.clone(), *status);
            }
            progress.apply(&update);
        }
        progress.finish();
    });

    let mut admin_code = ExitCode::Ok;
    for &id in &admin_ids {
        let qube_name = arena.get(id).name.clone();
        let mut log = match QubeLog::open(&qube_name, update_agent_manager::host_log_dir()) {
            Ok(log) => log,
            Err(e) => {
                tracing::error!("failed to open log file for {qube_name}: {e}");
                admin_code = admin_code.combine(ExitCode::ErrQrexec);
                continue;
            }
        };
        let outcome = update_agent_manager::run_agent_local(
            &qube_name,
            Path::new(ADMIN_VM_ENTRYPOINT),
            &agent_cli_args,
            args.show_progress(),
            args.show_output,
            &LocalProcessTransport,
            &status_tx,
            &mut log,
        );
        admin_code = admin_code.combine(outcome.code);
        print_outcome(&outcome);
    }

    let initially_running: HashMap<String, bool> =
        remote_ids.iter().map(|&id| (arena.get(id).name.clone(), arena.get(id).is_running)).collect();
    let qube_names: Vec<String> = remote_ids.iter().map(|&id| arena.get(id).name.clone()).collect();

    let termination = TerminationFlag::new();
    scheduler::install_sigint_handler(termination.clone());

    let agent_src = Arc::new(Path::new(AGENT_PAYLOAD_DIR).to_path_buf());
    let agent_cli_args = Arc::new(agent_cli_args);
    let show_progress = args.show_progress();
    let show_output = args.show_output;
    let cleanup = args.cleanup();
    let job_status_tx = status_tx.clone();
    let job_api = Arc::clone(&api);

    let job = move |qube: String| -> RunOutcome {
        let initially_running = *initially_running.get(&qube).unwrap_or(&false);
        let mut log = match QubeLog::open(&qube, update_agent_manager::host_log_dir()) {
            Ok(log) => log,
            Err(e) => {
                return RunOutcome {
                    qube: qube.clone(),
                    status: FinalStatus::Unknown,
                    code: ExitCode::ErrQrexec,
                    summary: vec![format!("failed to open log file: {e}")],
                }
            }
        };
        let api = Arc::clone(&job_api);
        let outcome = update_agent_manager::run_agent(
            &qube,
            agent_src.as_path(),
            &agent_cli_args,
            show_progress,
            show_output,
            cleanup,
            &QrexecTransport,
            job_status_tx.clone(),
            initially_running,
            move |q| api.shutdown_single(q),
            &mut log,
        );
        print_outcome(&outcome);
        outcome
    };

    let runtime = tokio::runtime::Runtime::new().expect("failed to start the tokio runtime");
    let remote_code = runtime.block_on(scheduler::run(
        qube_names,
        args.max_concurrency(),
        termination,
        status_tx.clone(),
        job,
    ));

    drop(status_tx);
    progress_handle.join().expect("progress thread panicked");

    let mut statuses: HashMap<QubeId, FinalStatus> = HashMap::new();
    for &id in admin_ids.iter().chain(remote_ids.iter()) {
        if let Some(status) = statuses_by_name.lock().expect("progress status map poisoned").get(&arena.get(id).name) {
            statuses.insert(id, *status);
        }
    }

    let plan = apply::plan(&arena, &statuses);
    let apply_code = apply::apply(&arena, &plan, args.apply_mode(), api.as_ref());

    let mut final_code = admin_code.combine(remote_code).combine(apply_code);
    if args.signal_no_updates && final_code == ExitCode::Ok {
        let nothing_updated = !statuses.is_empty() && statuses.values().all(|s| *s != FinalStatus::Success);
        if nothing_updated {
            final_code = ExitCode::OkNoUpdates;
        }
    }
    final_code
}

fn build_agent_cli_args(args: &Args) -> Vec<String> {
    let agent_args = AgentArgs {
        log: args.log.clone(),
        log_file: None,
        no_refresh: args.no_refresh,
        force_upgrade: args.force_upgrade,
        leave_obsolete: args.leave_obsolete,
        no_progress: !args.show_progress(),
        no_cleanup: args.no_cleanup,
        download_only: args.download_only,
        show_output: args.show_output,
        quiet: args.quiet,
    };
    agent_args.to_cli_args()
}

fn build_progress_sink(args: &Args) -> ProgressSink {
    match args.progress_mode() {
        ProgressMode::MultiBar => ProgressSink::MultiBar(MultiBarUi::new()),
        ProgressMode::Simple => ProgressSink::Simple(SimpleTerminalBar::new()),
        ProgressMode::None => ProgressSink::None,
    }
}

fn print_outcome(outcome: &RunOutcome) {
    for line in &outcome.summary {
        println!("{}: {line}", outcome.qube);
    }
}
