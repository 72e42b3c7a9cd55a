//! Events for the engine's queue, and the cross-thread handle that sends them.

use crate::display::ReconfigurationEvent;
use crate::error::EngineError;
use crate::state::EngineState;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// A request from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Turn darkroom mode on.
    Activate,
    /// Turn darkroom mode off and restore displays.
    Deactivate,
    /// Flip darkroom mode.
    Toggle,
    /// Re-push the tables now if active.
    Reapply,
    /// Deactivate and stop the event loop.
    Shutdown,
}

/// Everything that can be queued for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// A presentation-layer command.
    Command(Command),
    /// A display reconfiguration finished.
    Reconfigured(ReconfigurationEvent),
    /// The last [`EngineHandle`] was dropped.
    Detached,
}

/// The engine state published for other threads.
pub(crate) type SharedState = Arc<Mutex<EngineState>>;

pub(crate) fn read_shared(shared: &SharedState) -> EngineState {
    *shared.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_shared(shared: &SharedState, state: EngineState) {
    *shared.lock().unwrap_or_else(PoisonError::into_inner) = state;
}

#[derive(Debug)]
pub(crate) struct HandleLink {
    pub(crate) events: Sender<EngineEvent>,
    pub(crate) shared: SharedState,
}

impl Drop for HandleLink {
    fn drop(&mut self) {
        // The engine may already be gone.
        let _ = self.events.send(EngineEvent::Detached);
    }
}

/// A cloneable, thread-safe way to drive a running [`GammaEngine`](crate::GammaEngine).
///
/// Commands are queued and executed on the engine's thread, in order. When
/// every handle is dropped, [`GammaEngine::run`](crate::GammaEngine::run)
/// deactivates and returns.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    pub(crate) link: Arc<HandleLink>,
}

impl EngineHandle {
    fn send(&self, command: Command) -> Result<(), EngineError> {
        self.link
            .events
            .send(EngineEvent::Command(command))
            .map_err(|_| EngineError::Disconnected)
    }

    /// Queue activation.
    pub fn activate(&self) -> Result<(), EngineError> {
        self.send(Command::Activate)
    }

    /// Queue deactivation.
    pub fn deactivate(&self) -> Result<(), EngineError> {
        self.send(Command::Deactivate)
    }

    /// Queue a toggle.
    pub fn toggle(&self) -> Result<(), EngineError> {
        self.send(Command::Toggle)
    }

    /// Queue an immediate reapplication.
    pub fn reapply(&self) -> Result<(), EngineError> {
        self.send(Command::Reapply)
    }

    /// Queue shutdown. The engine deactivates before its loop returns.
    pub fn shutdown(&self) -> Result<(), EngineError> {
        self.send(Command::Shutdown)
    }

    /// Whether darkroom mode was on as of the engine's last completed step.
    pub fn is_active(&self) -> bool {
        read_shared(&self.link.shared).is_active
    }

    /// The state as of the engine's last completed step.
    pub fn state(&self) -> EngineState {
        read_shared(&self.link.shared)
    }

    /// A reference that does not keep the engine's loop alive.
    pub fn downgrade(&self) -> WeakEngineHandle {
        WeakEngineHandle {
            link: Arc::downgrade(&self.link),
        }
    }
}

/// A non-owning [`EngineHandle`], for places that outlive normal shutdown
/// such as signal handlers.
#[derive(Debug, Clone)]
pub struct WeakEngineHandle {
    link: Weak<HandleLink>,
}

impl WeakEngineHandle {
    /// Get a full handle if any other handle is still alive.
    pub fn upgrade(&self) -> Option<EngineHandle> {
        self.link.upgrade().map(|link| EngineHandle { link })
    }
}
