//! Error types for the gamma engine and its display backends.

use crate::display::DisplayId;

/// Errors that can occur while driving display gamma tables.
///
/// Enumeration and per-display push failures are transient: the display sink
/// logs and swallows them, and the next reapplication tries again.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Failed to load a system framework or library.
    #[error("Failed to load display library: {0}")]
    LibraryLoad(#[from] libloading::Error),

    /// The online display list could not be queried.
    #[error("Failed to enumerate online displays (error code: {0})")]
    EnumerationFailed(i32),

    /// A display rejected its transfer table.
    #[error("Display {display} rejected transfer table (error code: {code})")]
    TablePushRejected {
        /// The display that rejected the table.
        display: DisplayId,
        /// Platform error code.
        code: i32,
    },

    /// Restoring the default color settings failed.
    #[error("Failed to restore display color settings (error code: {0})")]
    RestoreFailed(i32),

    /// Registering or removing the reconfiguration callback failed.
    #[error("Reconfiguration callback registration failed (error code: {0})")]
    RegistrationFailed(i32),

    /// The backend cannot deliver display reconfiguration notifications.
    #[error("Display reconfiguration notifications are not available on this platform")]
    ReconfigurationUnsupported,

    /// A timing value was rejected.
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfig {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// No display backend exists for this platform.
    #[error("Gamma tables are not supported on this platform")]
    UnsupportedPlatform,

    /// The engine behind a handle has stopped.
    #[error("Engine is no longer running")]
    Disconnected,
}
