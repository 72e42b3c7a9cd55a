//! Red-on-black darkroom mode for displays.
//!
//! This crate rewrites each display's hardware gamma tables so red is inverted
//! and green/blue are blacked out, and keeps that transform applied against
//! OS color-management resets and display reconfiguration (sleep/wake,
//! resolution changes, monitors coming and going).
//!
//! # Example
//!
//! ```no_run
//! use redscreen_core::{EngineConfig, GammaEngine, system_backend};
//!
//! fn main() -> Result<(), redscreen_core::EngineError> {
//!     let mut engine = GammaEngine::new(system_backend()?, EngineConfig::default());
//!     let handle = engine.handle();
//!
//!     std::thread::spawn(move || {
//!         std::thread::sleep(std::time::Duration::from_secs(10));
//!         handle.shutdown().ok();
//!     });
//!
//!     engine.activate();
//!     // Reapplies every second until shutdown, then restores the displays.
//!     engine.run();
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! Use [`MockDisplays`] and [`ManualClock`] to drive the engine without hardware:
//!
//! ```
//! use redscreen_core::{EngineConfig, GammaEngine, ManualClock, MockDisplays};
//! use std::time::Duration;
//!
//! let mock = MockDisplays::with_displays(&[1]);
//! let clock = ManualClock::new();
//! let mut engine = GammaEngine::with_clock(mock.clone(), EngineConfig::default(), clock.clone());
//!
//! engine.activate();
//! clock.advance(Duration::from_secs(1));
//! engine.process_pending();
//! assert_eq!(mock.push_count(), 2);
//! ```

#![warn(missing_docs)]

mod config;
mod display;
mod engine;
mod error;
mod handle;
mod listener;
mod mock;
mod platform;
mod scheduler;
mod sink;
mod state;
mod tables;

// Re-export public API
pub use config::EngineConfig;
pub use display::{
    DisplayBackend, DisplayId, ListenerToken, ReconfigurationEvent, ReconfigurationHandler,
    ReconfigurationPhase,
};
pub use engine::{Flow, GammaEngine};
pub use error::EngineError;
pub use handle::{Command, EngineEvent, EngineHandle, WeakEngineHandle};
pub use listener::ReconfigurationListener;
pub use mock::MockDisplays;
#[cfg(windows)]
pub use platform::GdiDisplays;
pub use platform::{CoreGraphicsDisplays, system_backend};
pub use scheduler::{Clock, ManualClock, SystemClock, TimerId, TimerQueue, TimerTask};
pub use sink::{apply_to_displays, restore_displays};
pub use state::{ApplyReport, EngineState};
pub use tables::{GammaTables, TABLE_SIZE};
