//! Pushing tables to every online display, and undoing it.

use crate::display::DisplayBackend;
use crate::state::ApplyReport;
use crate::tables::GammaTables;
use log::{debug, trace, warn};

/// Push `tables` to every display that is online right now.
///
/// The display list is queried on every call. Zero displays is a no-op, and a
/// display that rejects its table does not stop the others from being tried.
pub fn apply_to_displays<B: DisplayBackend + ?Sized>(
    backend: &B,
    tables: &GammaTables,
) -> ApplyReport {
    let displays = match backend.online_displays() {
        Ok(displays) => displays,
        Err(e) => {
            debug!("display enumeration failed: {}", e);
            return ApplyReport::default();
        }
    };

    if displays.is_empty() {
        trace!("no online displays");
        return ApplyReport::default();
    }

    let mut report = ApplyReport {
        found: displays.len(),
        applied: 0,
    };

    for display in displays {
        match backend.set_transfer_table(display, tables) {
            Ok(()) => report.applied += 1,
            Err(e) => debug!("skipping display {}: {}", display, e),
        }
    }

    trace!("applied tables to {}/{} displays", report.applied, report.found);
    report
}

/// Ask the OS to restore its default color behavior on all displays.
pub fn restore_displays<B: DisplayBackend + ?Sized>(backend: &B) {
    if let Err(e) = backend.restore_color_settings() {
        warn!("restoring display color settings failed: {}", e);
    }
}
