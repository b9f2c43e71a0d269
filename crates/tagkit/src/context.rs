//! Apply callbacks
//!
//! These traits let the applier run without depending on a terminal: the
//! binary plugs in an interactive prompt and log-based progress, tests plug
//! in the no-op implementations below.

use crate::apply::ResourceOutcome;
use crate::error::Result;
use crate::types::ResourceId;

/// Progress callback for apply runs
pub trait ProgressCallback {
    /// Called before the updates of one resource are issued
    fn on_resource_start(&mut self, index: usize, total: usize, id: &ResourceId);

    /// Called with the description of every update, issued or not
    fn on_command(&mut self, description: &str);

    /// Called once a resource is finished
    fn on_resource_complete(&mut self, id: &ResourceId, outcome: &ResourceOutcome);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_resource_start(&mut self, _index: usize, _total: usize, _id: &ResourceId) {}
    fn on_command(&mut self, _description: &str) {}
    fn on_resource_complete(&mut self, _id: &ResourceId, _outcome: &ResourceOutcome) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}
