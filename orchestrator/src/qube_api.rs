//! The qube management API, treated as an out-of-scope external
//! collaborator: list domains, per-domain properties, features
//! mapping, shutdown, start. The orchestrator builds its [`crate::qube::QubeArena`]
//! from one [`QubesApi::list_qubes`] call and only comes back to this
//! trait for the post-update applier's lifecycle operations.

use crate::qube::QubeRecord;

#[cfg_attr(test, mockall::automock)]
pub trait QubesApi: Send + Sync {
    fn list_qubes(&self) -> Vec<QubeRecord>;

    /// The `qubes-vm-update-update-if-stale` dom0 feature, or `None` if unset.
    fn dom0_update_if_stale_feature(&self) -> Option<u32>;

    fn is_running(&self, qube: &str) -> bool;

    /// Shut down a single qube that was started only to run the update
    /// agent.
    fn shutdown_single(&self, qube: &str) -> bool;

    /// `shutdown(force=true)` for every qube in the batch, then block
    /// until all reach the halted state. Returns `false` if any qube in
    /// the batch failed to shut down.
    fn shutdown_and_wait(&self, qubes: &[String]) -> bool;

    fn start(&self, qube: &str) -> bool;
}
