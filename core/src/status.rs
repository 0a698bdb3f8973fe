//! Per-qube terminal/in-progress status.

/// Terminal outcome of one qube's update run. Truthy only for `Success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Success,
    Error,
    Cancelled,
    NoUpdates,
    /// Default when a qube never produced a terminal status
    /// (communication failure).
    Unknown,
}

impl FinalStatus {
    pub fn is_success(self) -> bool {
        matches!(self, FinalStatus::Success)
    }

    /// The keyword used by the simple terminal bar's `info` field.
    pub fn keyword(self) -> &'static str {
        match self {
            FinalStatus::Success => "success",
            FinalStatus::Error => "error",
            FinalStatus::Cancelled => "cancelled",
            FinalStatus::NoUpdates => "no_updates",
            FinalStatus::Unknown => "unknown",
        }
    }
}

impl Default for FinalStatus {
    fn default() -> Self {
        FinalStatus::Unknown
    }
}

/// A qube's status line: advances monotonically
/// `Pending -> Updating*(non-decreasing %) -> Done(_)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunStatus {
    Pending,
    Updating(f64),
    Done(FinalStatus),
}

impl RunStatus {
    /// The `status_keyword` used by the simple terminal bar.
    pub fn keyword(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Updating(_) => "updating",
            RunStatus::Done(_) => "done",
        }
    }

    /// The `info` field of the simple terminal bar line: a percent for
    /// `Updating`, the terminal status keyword for `Done`, empty for
    /// `Pending`.
    pub fn info(&self) -> String {
        match self {
            RunStatus::Pending => String::new(),
            RunStatus::Updating(p) => format!("{p:.2}"),
            RunStatus::Done(status) => status.keyword().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_success_is_truthy() {
        assert!(FinalStatus::Success.is_success());
        for s in [
            FinalStatus::Error,
            FinalStatus::Cancelled,
            FinalStatus::NoUpdates,
            FinalStatus::Unknown,
        ] {
            assert!(!s.is_success());
        }
    }

    #[test]
    fn default_final_status_is_unknown() {
        assert_eq!(FinalStatus::default(), FinalStatus::Unknown);
    }

    #[test]
    fn simple_bar_info_formatting() {
        assert_eq!(RunStatus::Pending.info(), "");
        assert_eq!(RunStatus::Updating(42.5).info(), "42.50");
        assert_eq!(RunStatus::Done(FinalStatus::Success).info(), "success");
    }
}
