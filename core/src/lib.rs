#![forbid(unsafe_code)]
#![warn(unreachable_pub)]

pub mod exit_code;
pub mod package_set;
pub mod process_result;
pub mod progress;
pub mod sanitize;
pub mod status;

pub use exit_code::ExitCode;
pub use package_set::{PackageDiff, PackageSet};
pub use process_result::ProcessResult;
pub use progress::{ProgressPhase, ProgressReporter};
pub use status::{FinalStatus, RunStatus};
