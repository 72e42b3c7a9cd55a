use std::io::{self, BufRead};
use std::time::Duration;

use clap::Parser;
use log::{debug, info, warn};
use redscreen_core::{
    EngineConfig, EngineError, EngineHandle, GammaEngine, WeakEngineHandle, system_backend,
};

#[derive(Parser, Debug)]
#[command(name = "redscreen")]
#[command(author, version, about = "Red-on-black darkroom mode for your displays")]
struct Cli {
    /// Start with darkroom mode off
    #[arg(long)]
    start_inactive: bool,

    /// How often to reassert the tables, in milliseconds
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Wait after a display reconfiguration before reapplying, in milliseconds
    #[arg(long, default_value_t = 300)]
    settle_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Toggle,
    On,
    Off,
    Reapply,
    Status,
    Help,
    Quit,
}

fn parse_input(line: &str) -> Option<Input> {
    match line.trim().to_ascii_lowercase().as_str() {
        "t" | "toggle" | "d" => Some(Input::Toggle),
        "on" | "enable" => Some(Input::On),
        "off" | "disable" => Some(Input::Off),
        "r" | "reapply" => Some(Input::Reapply),
        "s" | "status" => Some(Input::Status),
        "h" | "help" | "?" => Some(Input::Help),
        "q" | "quit" | "exit" => Some(Input::Quit),
        _ => None,
    }
}

fn print_help() {
    println!("commands: [t]oggle, on, off, [r]eapply, [s]tatus, [h]elp, [q]uit");
}

fn print_status(handle: &EngineHandle) {
    let state = handle.state();
    let label = if state.is_active {
        "Darkroom Enabled"
    } else {
        "Darkroom Disabled"
    };
    match state.last_apply {
        Some(report) if state.is_active => println!(
            "{} ({} of {} displays, {} passes)",
            label, report.applied, report.found, state.apply_passes
        ),
        _ => println!("{}", label),
    }
}

/// Read commands from stdin and queue them. EOF quits.
fn read_commands(handle: EngineHandle) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let result = match parse_input(&line) {
            Some(Input::Toggle) => handle.toggle(),
            Some(Input::On) => handle.activate(),
            Some(Input::Off) => handle.deactivate(),
            Some(Input::Reapply) => handle.reapply(),
            Some(Input::Status) => {
                print_status(&handle);
                Ok(())
            }
            Some(Input::Help) => {
                print_help();
                Ok(())
            }
            Some(Input::Quit) => break,
            None => {
                println!("unknown command: {}", line.trim());
                print_help();
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("{}", e);
            break;
        }
    }

    debug!("input closed, shutting down");
    // The engine restores the displays before its loop returns.
    let _ = handle.shutdown();
}

/// Ask the engine to restore the displays and stop, if it is still running.
fn request_shutdown(handle: &WeakEngineHandle) {
    match handle.upgrade() {
        Some(handle) => {
            if let Err(e) = handle.shutdown() {
                debug!("shutdown not delivered: {}", e);
            }
        }
        None => debug!("engine already stopping"),
    }
}

fn main() -> Result<(), EngineError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = EngineConfig::new(
        Duration::from_millis(cli.interval_ms),
        Duration::from_millis(cli.settle_ms),
    )?;

    let mut engine = GammaEngine::new(system_backend()?, config);
    let handle = engine.handle();

    if !cli.start_inactive {
        engine.activate();
    }

    let on_signal = handle.downgrade();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("interrupted, restoring displays");
        request_shutdown(&on_signal);
    }) {
        warn!("could not install signal handler: {}", e);
    }

    print_help();
    std::thread::spawn(move || read_commands(handle));

    engine.run();
    Ok(())
}
