//! Display backend abstraction.

use crate::error::EngineError;
use crate::tables::GammaTables;
use std::fmt;

// =============================================================================
// Identifiers
// =============================================================================

/// Opaque handle to one online display, as supplied by the display subsystem.
///
/// Never cache these across apply passes; the set changes as monitors come and go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisplayId(u64);

impl DisplayId {
    /// Wrap a raw platform identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw platform identifier.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Identifies one reconfiguration callback registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

impl ListenerToken {
    /// Wrap a backend-chosen registration id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The backend-chosen registration id.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

// =============================================================================
// Reconfiguration notifications
// =============================================================================

/// Which half of a display reconfiguration a notification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconfigurationPhase {
    /// The display subsystem is about to change. Tables pushed now are unreliable.
    Begin,
    /// The change has completed.
    End,
}

/// A display topology/settings change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconfigurationEvent {
    /// The display the notification was raised for.
    pub display: DisplayId,
    /// Begin or end of the reconfiguration.
    pub phase: ReconfigurationPhase,
}

impl ReconfigurationEvent {
    /// Notification that a reconfiguration is starting.
    pub fn begin(display: DisplayId) -> Self {
        Self {
            display,
            phase: ReconfigurationPhase::Begin,
        }
    }

    /// Notification that a reconfiguration has finished.
    pub fn end(display: DisplayId) -> Self {
        Self {
            display,
            phase: ReconfigurationPhase::End,
        }
    }
}

/// Callback a backend invokes for each reconfiguration notification.
pub type ReconfigurationHandler = Box<dyn Fn(ReconfigurationEvent) + Send + 'static>;

// =============================================================================
// Display Backend Trait
// =============================================================================

/// Access to the platform's display gamma facilities.
///
/// This allows for mock implementations in tests.
pub trait DisplayBackend {
    /// List the displays that are currently online. May be empty.
    fn online_displays(&self) -> Result<Vec<DisplayId>, EngineError>;

    /// Push the three channel curves to one display.
    fn set_transfer_table(&self, display: DisplayId, tables: &GammaTables)
    -> Result<(), EngineError>;

    /// Restore the system's default color behavior on all displays.
    fn restore_color_settings(&self) -> Result<(), EngineError>;

    /// Start delivering reconfiguration notifications to `handler`.
    fn register_reconfiguration(
        &self,
        handler: ReconfigurationHandler,
    ) -> Result<ListenerToken, EngineError>;

    /// Stop delivering notifications for `token`. The handler never fires afterwards.
    fn unregister_reconfiguration(&self, token: ListenerToken) -> Result<(), EngineError>;

    /// Deliver any native notifications that are waiting on the current thread.
    fn dispatch_pending(&self) {}

    /// Whether [`dispatch_pending`](Self::dispatch_pending) must be called regularly.
    fn needs_event_pump(&self) -> bool {
        false
    }
}

impl<T: DisplayBackend + ?Sized> DisplayBackend for Box<T> {
    fn online_displays(&self) -> Result<Vec<DisplayId>, EngineError> {
        (**self).online_displays()
    }

    fn set_transfer_table(
        &self,
        display: DisplayId,
        tables: &GammaTables,
    ) -> Result<(), EngineError> {
        (**self).set_transfer_table(display, tables)
    }

    fn restore_color_settings(&self) -> Result<(), EngineError> {
        (**self).restore_color_settings()
    }

    fn register_reconfiguration(
        &self,
        handler: ReconfigurationHandler,
    ) -> Result<ListenerToken, EngineError> {
        (**self).register_reconfiguration(handler)
    }

    fn unregister_reconfiguration(&self, token: ListenerToken) -> Result<(), EngineError> {
        (**self).unregister_reconfiguration(token)
    }

    fn dispatch_pending(&self) {
        (**self).dispatch_pending()
    }

    fn needs_event_pump(&self) -> bool {
        (**self).needs_event_pump()
    }
}
