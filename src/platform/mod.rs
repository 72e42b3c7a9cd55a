//! Platform display backends.

mod core_graphics;
#[cfg(windows)]
mod gdi;

pub use core_graphics::CoreGraphicsDisplays;
#[cfg(windows)]
pub use gdi::GdiDisplays;

use crate::display::DisplayBackend;
use crate::error::EngineError;

/// The display backend for the platform this binary was built for.
///
/// # Errors
/// [`EngineError::LibraryLoad`] if CoreGraphics fails to load.
#[cfg(target_os = "macos")]
pub fn system_backend() -> Result<Box<dyn DisplayBackend>, EngineError> {
    Ok(Box::new(CoreGraphicsDisplays::load()?))
}

/// The display backend for the platform this binary was built for.
#[cfg(windows)]
pub fn system_backend() -> Result<Box<dyn DisplayBackend>, EngineError> {
    Ok(Box::new(GdiDisplays::new()))
}

/// The display backend for the platform this binary was built for.
///
/// # Errors
/// Always [`EngineError::UnsupportedPlatform`]; no gamma backend exists here.
#[cfg(not(any(target_os = "macos", windows)))]
pub fn system_backend() -> Result<Box<dyn DisplayBackend>, EngineError> {
    Err(EngineError::UnsupportedPlatform)
}
