//! Display reconfiguration listener.

use crate::display::{DisplayBackend, ListenerToken, ReconfigurationPhase};
use crate::error::EngineError;
use crate::handle::EngineEvent;
use log::{debug, trace};
use std::sync::mpsc::Sender;

/// A live reconfiguration callback registration.
///
/// The registered handler only forwards end-of-reconfiguration notifications
/// onto the engine's event queue; it never touches engine state itself.
#[derive(Debug)]
pub struct ReconfigurationListener {
    token: ListenerToken,
}

impl ReconfigurationListener {
    /// Register with `backend`, forwarding notifications to `events`.
    pub fn register<B: DisplayBackend + ?Sized>(
        backend: &B,
        events: Sender<EngineEvent>,
    ) -> Result<Self, EngineError> {
        let token = backend.register_reconfiguration(Box::new(move |event| {
            if event.phase == ReconfigurationPhase::Begin {
                trace!("ignoring reconfiguration begin for display {}", event.display);
                return;
            }
            // The engine may already be gone during shutdown.
            let _ = events.send(EngineEvent::Reconfigured(event));
        }))?;

        debug!("reconfiguration listener registered ({:?})", token);
        Ok(Self { token })
    }

    /// Remove the registration. The handler never fires afterwards.
    pub fn unregister<B: DisplayBackend + ?Sized>(self, backend: &B) -> Result<(), EngineError> {
        backend.unregister_reconfiguration(self.token)?;
        debug!("reconfiguration listener removed ({:?})", self.token);
        Ok(())
    }
}
