//! Example: Enable darkroom mode for a few seconds, then restore.
//!
//! Run with: `cargo run --example darkroom_once`

use std::time::Duration;

use redscreen_core::{EngineConfig, EngineError, GammaEngine, system_backend};

fn main() -> Result<(), EngineError> {
    // Initialize logging (optional)
    env_logger::init();

    // Create the engine over this platform's displays
    let mut engine = GammaEngine::new(system_backend()?, EngineConfig::default());
    let handle = engine.handle();

    // Stop after five seconds
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(5));
        handle.shutdown().ok();
    });

    engine.activate();
    let state = engine.state();
    println!(
        "Darkroom enabled on {} display(s)",
        state.last_apply.map(|r| r.applied).unwrap_or(0)
    );

    // Reapplies every second until shutdown, then restores
    engine.run();
    println!("Displays restored");

    Ok(())
}
