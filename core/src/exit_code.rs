//! The stable exit-code wire contract shared by agent and orchestrator.

use std::process::{ExitCode as StdExitCode, Termination};

/// Every code the agent or orchestrator may return, per the wire taxonomy.
///
/// Values are chosen to match the contract exactly; do not renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ExitCode {
    Ok = 0,
    Err = 1,
    ErrShutdownTmpl = 11,
    ErrShutdownApp = 12,
    ErrStartApp = 13,
    ErrVm = 21,
    ErrVmPre = 22,
    ErrVmRefresh = 23,
    ErrVmUpdate = 24,
    ErrVmCleanup = 25,
    ErrVmUnhandled = 26,
    ErrQrexec = 40,
    ErrUsage = 64,
    OkNoUpdates = 100,
    Sigint = 130,
}

impl ExitCode {
    /// Codes an in-qube agent run may legitimately leave behind; anything
    /// else observed from the agent is remapped to [`ExitCode::ErrVmUnhandled`].
    pub const VM_HANDLED: [ExitCode; 7] = [
        ExitCode::Ok,
        ExitCode::OkNoUpdates,
        ExitCode::ErrVm,
        ExitCode::ErrVmPre,
        ExitCode::ErrVmRefresh,
        ExitCode::ErrVmUpdate,
        ExitCode::ErrVmCleanup,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn is_vm_handled(self) -> bool {
        Self::VM_HANDLED.contains(&self)
    }

    /// Reinterpret a raw agent exit code, remapping anything outside the
    /// handled set to `ErrVmUnhandled`.
    pub fn from_agent_raw(code: i32) -> ExitCode {
        match ExitCode::from_raw(code) {
            Some(ec) if ec.is_vm_handled() => ec,
            _ => ExitCode::ErrVmUnhandled,
        }
    }

    pub fn from_raw(code: i32) -> Option<ExitCode> {
        Some(match code {
            0 => ExitCode::Ok,
            1 => ExitCode::Err,
            11 => ExitCode::ErrShutdownTmpl,
            12 => ExitCode::ErrShutdownApp,
            13 => ExitCode::ErrStartApp,
            21 => ExitCode::ErrVm,
            22 => ExitCode::ErrVmPre,
            23 => ExitCode::ErrVmRefresh,
            24 => ExitCode::ErrVmUpdate,
            25 => ExitCode::ErrVmCleanup,
            26 => ExitCode::ErrVmUnhandled,
            40 => ExitCode::ErrQrexec,
            64 => ExitCode::ErrUsage,
            100 => ExitCode::OkNoUpdates,
            130 => ExitCode::Sigint,
            _ => return None,
        })
    }

    /// Severity rank for [`Self::combine`]. Deliberately not the wire code
    /// value: `OkNoUpdates` (100) numerically exceeds every error slot but
    /// is not worse than any of them. It also ranks equal to, not above,
    /// `Ok`: a per-qube or per-phase `OkNoUpdates` must not by itself push
    /// an otherwise-successful aggregate past plain `Ok` — translating an
    /// all-success-or-no-updates fleet to code 100 is `--signal-no-updates`'s
    /// job alone, applied once at the very end, not an emergent effect of
    /// folding per-qube codes through `combine`.
    fn severity(self) -> u8 {
        match self {
            ExitCode::Ok | ExitCode::OkNoUpdates => 0,
            ExitCode::Err => 2,
            ExitCode::ErrShutdownTmpl => 3,
            ExitCode::ErrShutdownApp => 4,
            ExitCode::ErrStartApp => 5,
            ExitCode::ErrVm => 6,
            ExitCode::ErrVmPre => 7,
            ExitCode::ErrVmRefresh => 8,
            ExitCode::ErrVmUpdate => 9,
            ExitCode::ErrVmCleanup => 10,
            ExitCode::ErrVmUnhandled => 11,
            ExitCode::ErrQrexec => 12,
            ExitCode::ErrUsage => 13,
            ExitCode::Sigint => 14,
        }
    }

    /// Worst-wins combine: `Sigint` always dominates; otherwise the code with higher [`Self::severity`]
    /// wins.
    pub fn combine(self, other: ExitCode) -> ExitCode {
        if self == ExitCode::Sigint || other == ExitCode::Sigint {
            return ExitCode::Sigint;
        }
        if self.severity() >= other.severity() {
            self
        } else {
            other
        }
    }
}

impl Default for ExitCode {
    fn default() -> Self {
        ExitCode::Ok
    }
}

impl Termination for ExitCode {
    fn report(self) -> StdExitCode {
        StdExitCode::from(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vm_handled_closure_matches_taxonomy() {
        for code in [0, 100, 21, 22, 23, 24, 25] {
            assert!(ExitCode::from_raw(code).unwrap().is_vm_handled());
        }
        assert!(!ExitCode::ErrVmUnhandled.is_vm_handled());
    }

    #[test]
    fn unknown_agent_code_becomes_unhandled() {
        assert_eq!(ExitCode::from_agent_raw(77), ExitCode::ErrVmUnhandled);
    }

    #[test]
    fn combine_is_worst_wins() {
        assert_eq!(
            ExitCode::ErrVmUnhandled.combine(ExitCode::OkNoUpdates),
            ExitCode::ErrVmUnhandled
        );
        assert_eq!(ExitCode::Ok.combine(ExitCode::ErrVmPre), ExitCode::ErrVmPre);
    }

    #[test]
    fn no_updates_does_not_outrank_ok() {
        assert_eq!(ExitCode::Ok.combine(ExitCode::OkNoUpdates), ExitCode::Ok);
        assert_eq!(ExitCode::OkNoUpdates.combine(ExitCode::Ok), ExitCode::OkNoUpdates);
    }

    #[test]
    fn sigint_dominates_errors() {
        assert_eq!(ExitCode::Sigint.combine(ExitCode::ErrVmUnhandled), ExitCode::Sigint);
        assert_eq!(ExitCode::ErrUsage.combine(ExitCode::Sigint), ExitCode::Sigint);
    }
}
