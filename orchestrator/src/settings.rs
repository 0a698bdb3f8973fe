//! Orchestrator CLI surface.

use clap::Parser;

use crate::BUILD_INFO;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    ForceUpdate,
    UpdateIfAvailable,
    UpdateIfStale(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    NoApply,
    ApplyToSys,
    ApplyToAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    MultiBar,
    Simple,
    None,
}

#[derive(Debug, Parser)]
#[command(author, version = BUILD_INFO.version)]
pub struct Args {
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    #[arg(long)]
    pub dry_run: bool,

    /// Map overall OK + nothing-updated -> OK_NO_UPDATES (100).
    #[arg(long)]
    pub signal_no_updates: bool,

    #[arg(long, conflicts_with_all = ["apply_to_all", "no_apply"])]
    pub apply_to_sys: bool,

    #[arg(long, conflicts_with_all = ["apply_to_sys", "no_apply"])]
    pub apply_to_all: bool,

    #[arg(long, conflicts_with_all = ["apply_to_sys", "apply_to_all"])]
    pub no_apply: bool,

    #[arg(long, conflicts_with_all = ["update_if_available", "update_if_stale"])]
    pub force_update: bool,

    #[arg(long, conflicts_with_all = ["force_update", "update_if_stale"])]
    pub update_if_available: bool,

    #[arg(long, conflicts_with_all = ["force_update", "update_if_available"])]
    pub update_if_stale: Option<u32>,

    #[arg(long, value_delimiter = ',')]
    pub targets: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    #[arg(long)]
    pub templates: bool,

    #[arg(long)]
    pub standalones: bool,

    #[arg(long)]
    pub apps: bool,

    #[arg(long)]
    pub all: bool,

    #[arg(long, default_value = "info")]
    pub log: String,

    #[arg(long)]
    pub no_cleanup: bool,

    #[arg(long, conflicts_with = "quiet")]
    pub show_output: bool,

    #[arg(long, conflicts_with = "show_output")]
    pub quiet: bool,

    #[arg(long, conflicts_with = "just_print_progress")]
    pub no_progress: bool,

    #[arg(long, conflicts_with = "no_progress")]
    pub just_print_progress: bool,

    /// Agent-side flags forwarded verbatim. Not exposed as named orchestrator flags; set via the
    /// underlying `qubes_update_agent::settings::Args` fields instead
    /// when building the remote invocation.
    #[arg(long)]
    pub no_refresh: bool,

    #[arg(long)]
    pub leave_obsolete: bool,

    #[arg(long)]
    pub force_upgrade: bool,

    #[arg(long)]
    pub download_only: bool,
}

impl Args {
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency.unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
    }

    pub fn cleanup(&self) -> bool {
        !self.no_cleanup
    }

    pub fn apply_mode(&self) -> ApplyMode {
        if self.apply_to_all {
            ApplyMode::ApplyToAll
        } else if self.apply_to_sys {
            ApplyMode::ApplyToSys
        } else {
            ApplyMode::NoApply
        }
    }

    /// dom0 feature default (7) is substituted by the caller when
    /// `update_if_stale` is `None` and no explicit mode flag was given.
    pub fn update_mode(&self, dom0_stale_days: Option<u32>) -> UpdateMode {
        if self.force_update {
            UpdateMode::ForceUpdate
        } else if self.update_if_available {
            UpdateMode::UpdateIfAvailable
        } else {
            let days = self.update_if_stale.or(dom0_stale_days).unwrap_or(7);
            UpdateMode::UpdateIfStale(days)
        }
    }

    pub fn progress_mode(&self) -> ProgressMode {
        if self.no_progress {
            ProgressMode::None
        } else if self.just_print_progress {
            ProgressMode::Simple
        } else {
            ProgressMode::MultiBar
        }
    }

    pub fn show_progress(&self) -> bool {
        !matches!(self.progress_mode(), ProgressMode::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_apply_mode_is_no_apply() {
        let args = Args::parse_from(["orchestrator"]);
        assert_eq!(args.apply_mode(), ApplyMode::NoApply);
    }

    #[test]
    fn update_if_stale_falls_back_to_dom0_feature_then_seven() {
        let args = Args::parse_from(["orchestrator"]);
        assert_eq!(args.update_mode(Some(14)), UpdateMode::UpdateIfStale(14));
        assert_eq!(args.update_mode(None), UpdateMode::UpdateIfStale(7));
    }

    #[test]
    fn explicit_update_if_stale_overrides_dom0_feature() {
        let args = Args::parse_from(["orchestrator", "--update-if-stale", "3"]);
        assert_eq!(args.update_mode(Some(14)), UpdateMode::UpdateIfStale(3));
    }

    #[test]
    fn apply_modes_are_mutually_exclusive() {
        let result = Args::try_parse_from(["orchestrator", "--apply-to-sys", "--apply-to-all"]);
        assert!(result.is_err());
    }

    #[test]
    fn targets_split_on_comma() {
        let args = Args::parse_from(["orchestrator", "--targets", "a,b,c"]);
        assert_eq!(args.targets, vec!["a", "b", "c"]);
    }

    #[test]
    fn no_progress_and_just_print_progress_conflict() {
        let result = Args::try_parse_from(["orchestrator", "--no-progress", "--just-print-progress"]);
        assert!(result.is_err());
    }
}
