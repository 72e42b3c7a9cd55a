//! Engine state snapshot.

/// Outcome of one pass over the online displays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Displays that were online when the pass started.
    pub found: usize,
    /// Displays that accepted the tables.
    pub applied: usize,
}

impl ApplyReport {
    /// True when every online display accepted the tables.
    pub fn is_complete(&self) -> bool {
        self.applied == self.found
    }
}

/// A snapshot of the engine's current state.
///
/// Use [`GammaEngine::state`](crate::GammaEngine::state) or
/// [`EngineHandle::state`](crate::EngineHandle::state) to obtain one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineState {
    /// Whether darkroom mode is on.
    pub is_active: bool,
    /// Result of the most recent apply pass since activation.
    pub last_apply: Option<ApplyReport>,
    /// Apply passes since activation, including reapplications.
    pub apply_passes: u64,
}
