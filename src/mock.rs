//! Mock display backend for testing.

use crate::display::{
    DisplayBackend, DisplayId, ListenerToken, ReconfigurationEvent, ReconfigurationHandler,
};
use crate::error::EngineError;
use crate::tables::GammaTables;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct MockState {
    online: BTreeSet<DisplayId>,
    rejecting: BTreeSet<DisplayId>,
    enumeration_fails: bool,
    registration_fails: bool,
    needs_event_pump: bool,
    pushes: HashMap<DisplayId, usize>,
    last_tables: Option<GammaTables>,
    restores: usize,
    registrations: usize,
    next_token: u64,
    handlers: HashMap<ListenerToken, ReconfigurationHandler>,
}

/// A mock display backend for testing.
///
/// This allows testing the engine without real displays. Clones share state,
/// so a test can keep one copy for inspection while the engine owns another.
///
/// # Example
///
/// ```
/// use redscreen_core::{DisplayId, EngineConfig, GammaEngine, MockDisplays};
///
/// let mock = MockDisplays::with_displays(&[1]);
/// let mut engine = GammaEngine::new(mock.clone(), EngineConfig::default());
/// engine.activate();
/// assert_eq!(mock.pushes_for(DisplayId::new(1)), 1);
/// ```
#[derive(Clone, Default)]
pub struct MockDisplays {
    state: Arc<Mutex<MockState>>,
}

impl MockDisplays {
    /// Create a mock with no online displays.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock with the given displays online.
    pub fn with_displays(ids: &[u64]) -> Self {
        let mock = Self::new();
        for &id in ids {
            mock.connect(DisplayId::new(id));
        }
        mock
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bring a display online.
    pub fn connect(&self, display: DisplayId) {
        self.lock().online.insert(display);
    }

    /// Take a display offline.
    pub fn disconnect(&self, display: DisplayId) {
        self.lock().online.remove(&display);
    }

    /// Make a display reject every table pushed to it.
    pub fn reject(&self, display: DisplayId) {
        self.lock().rejecting.insert(display);
    }

    /// Make display enumeration fail (or succeed again).
    pub fn fail_enumeration(&self, fail: bool) {
        self.lock().enumeration_fails = fail;
    }

    /// Make reconfiguration registration fail (or succeed again).
    pub fn fail_registration(&self, fail: bool) {
        self.lock().registration_fails = fail;
    }

    /// Report that notifications need the engine to pump the backend.
    pub fn set_needs_event_pump(&self, needs: bool) {
        self.lock().needs_event_pump = needs;
    }

    /// Total accepted table pushes across all displays.
    pub fn push_count(&self) -> usize {
        self.lock().pushes.values().sum()
    }

    /// Accepted table pushes for one display.
    pub fn pushes_for(&self, display: DisplayId) -> usize {
        self.lock().pushes.get(&display).copied().unwrap_or(0)
    }

    /// The most recently accepted tables.
    pub fn last_tables(&self) -> Option<GammaTables> {
        self.lock().last_tables.clone()
    }

    /// Number of restore requests.
    pub fn restore_count(&self) -> usize {
        self.lock().restores
    }

    /// Number of reconfiguration registrations ever made.
    pub fn registration_count(&self) -> usize {
        self.lock().registrations
    }

    /// Number of handlers currently registered.
    pub fn active_listeners(&self) -> usize {
        self.lock().handlers.len()
    }

    /// Deliver a notification to every registered handler.
    ///
    /// Returns how many handlers received it.
    pub fn emit(&self, event: ReconfigurationEvent) -> usize {
        let state = self.lock();
        for handler in state.handlers.values() {
            handler(event);
        }
        state.handlers.len()
    }
}

impl DisplayBackend for MockDisplays {
    fn online_displays(&self) -> Result<Vec<DisplayId>, EngineError> {
        let state = self.lock();
        if state.enumeration_fails {
            return Err(EngineError::EnumerationFailed(-1));
        }
        Ok(state.online.iter().copied().collect())
    }

    fn set_transfer_table(
        &self,
        display: DisplayId,
        tables: &GammaTables,
    ) -> Result<(), EngineError> {
        let mut state = self.lock();
        if state.rejecting.contains(&display) || !state.online.contains(&display) {
            return Err(EngineError::TablePushRejected { display, code: -1 });
        }
        *state.pushes.entry(display).or_insert(0) += 1;
        state.last_tables = Some(tables.clone());
        Ok(())
    }

    fn restore_color_settings(&self) -> Result<(), EngineError> {
        self.lock().restores += 1;
        Ok(())
    }

    fn register_reconfiguration(
        &self,
        handler: ReconfigurationHandler,
    ) -> Result<ListenerToken, EngineError> {
        let mut state = self.lock();
        if state.registration_fails {
            return Err(EngineError::RegistrationFailed(-1));
        }
        state.registrations += 1;
        state.next_token += 1;
        let token = ListenerToken::new(state.next_token);
        state.handlers.insert(token, handler);
        Ok(token)
    }

    fn unregister_reconfiguration(&self, token: ListenerToken) -> Result<(), EngineError> {
        self.lock().handlers.remove(&token);
        Ok(())
    }

    fn needs_event_pump(&self) -> bool {
        self.lock().needs_event_pump
    }
}
