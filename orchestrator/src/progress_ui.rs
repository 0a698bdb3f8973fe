//! Per-qube progress display: an `indicatif` multi-bar TTY
//! UI, or a machine-parseable `"{qube} {status} {info}\n"` line mode for
//! `--just-print-progress`. Grounded on `update_manager.py`'s
//! `MultipleUpdateMultipleProgressBar` (tqdm-per-qube), reimplemented with
//! `indicatif` for long-running multi-item progress.

use std::collections::HashMap;
use std::io::Write;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use qubes_update_core::{FinalStatus, RunStatus};

use crate::qube_connection::StatusUpdate;

/// What a caller chose via `--no-progress` / `--just-print-progress`.
pub enum ProgressSink {
    MultiBar(MultiBarUi),
    Simple(SimpleTerminalBar),
    None,
}

impl ProgressSink {
    pub fn add_qube(&mut self, qube: &str) {
        if let ProgressSink::MultiBar(ui) = self {
            ui.add_bar(qube);
        }
    }

    pub fn apply(&mut self, update: &StatusUpdate) {
        match self {
            ProgressSink::MultiBar(ui) => ui.apply(update),
            ProgressSink::Simple(bar) => bar.apply(update),
            ProgressSink::None => {}
        }
    }

    pub fn finish(&mut self) {
        if let ProgressSink::MultiBar(ui) = self {
            ui.finish();
        }
    }
}

/// One `indicatif` bar per qube, advancing to `percent` on `UPDATING` and
/// switching its message to the terminal status on `DONE`.
pub struct MultiBarUi {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
}

impl Default for MultiBarUi {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiBarUi {
    pub fn new() -> Self {
        Self { multi: MultiProgress::new(), bars: HashMap::new() }
    }

    pub fn add_bar(&mut self, qube: &str) {
        let bar = self.multi.add(ProgressBar::new(100));
        bar.set_style(
            ProgressStyle::with_template("{msg:.cyan} [{bar:40}] {pos:>3}/{len:3}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(format!("{qube} (pending)"));
        self.bars.insert(qube.to_string(), bar);
    }

    pub fn apply(&mut self, update: &StatusUpdate) {
        match update {
            StatusUpdate::Updating { qube, percent } => {
                if let Some(bar) = self.bars.get(qube) {
                    bar.set_position(percent.round() as u64);
                    bar.set_message(format!("{qube} (updating)"));
                }
            }
            StatusUpdate::Done { qube, status } => {
                if let Some(bar) = self.bars.get(qube) {
                    bar.set_position(100);
                    bar.set_message(format!("{qube} ({})", status.keyword()));
                    bar.finish();
                }
            }
        }
    }

    pub fn finish(&mut self) {
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.finish();
            }
        }
    }
}

/// Emits one `"{qube} {status_keyword} {info}\n"` line to stderr per
/// status change, for consumption by a machine reader.
#[derive(Default)]
pub struct SimpleTerminalBar {
    last: HashMap<String, RunStatus>,
}

impl SimpleTerminalBar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, update: &StatusUpdate) {
        let (qube, status) = match update {
            StatusUpdate::Updating { qube, percent } => (qube.clone(), RunStatus::Updating(*percent)),
            StatusUpdate::Done { qube, status } => (qube.clone(), RunStatus::Done(*status)),
        };
        self.emit(&qube, status);
        self.last.insert(qube, status);
    }

    fn emit(&self, qube: &str, status: RunStatus) {
        let _ = writeln!(std::io::stderr(), "{qube} {} {}", status.keyword(), status.info());
    }

    pub fn mark_pending(&mut self, qube: &str) {
        self.emit(qube, RunStatus::Pending);
        self.last.insert(qube.to_string(), RunStatus::Pending);
    }
}

/// Whether `status` marks a DONE event carrying `FinalStatus::Cancelled`
/// (used by the scheduler to short-circuit already-dispatched bars).
pub fn is_cancelled_done(update: &StatusUpdate) -> bool {
    matches!(update, StatusUpdate::Done { status: FinalStatus::Cancelled, .. })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_bar_tracks_last_status_per_qube() {
        let mut bar = SimpleTerminalBar::new();
        bar.apply(&StatusUpdate::Updating { qube: "w1".into(), percent: 42.0 });
        assert_eq!(bar.last.get("w1"), Some(&RunStatus::Updating(42.0)));
        bar.apply(&StatusUpdate::Done { qube: "w1".into(), status: FinalStatus::Success });
        assert_eq!(bar.last.get("w1"), Some(&RunStatus::Done(FinalStatus::Success)));
    }

    #[test]
    fn is_cancelled_done_detects_only_cancelled() {
        assert!(is_cancelled_done(&StatusUpdate::Done { qube: "w1".into(), status: FinalStatus::Cancelled }));
        assert!(!is_cancelled_done(&StatusUpdate::Done { qube: "w1".into(), status: FinalStatus::Success }));
        assert!(!is_cancelled_done(&StatusUpdate::Updating { qube: "w1".into(), percent: 1.0 }));
    }
}
