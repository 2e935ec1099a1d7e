//! `shub` – Sensor hub operator console.
//!
//! This binary brings up a supervised hub and hands the operator a console.
//! It:
//!
//! 1. Loads `~/.shub/board.toml`, writing the defaults on first run.
//! 2. Starts a simulated hub (motion and environment sensors) under the
//!    kernel supervisor, with notifications routed through the event bus.
//! 3. Prints every reset, dump and self-check notification as it happens.
//! 4. Drops the user into an **interactive REPL** with slash-commands
//!    (`/status`, `/enable`, `/reset`, `/selfcheck`, `/help`, ...).
//! 5. Intercepts **Ctrl-C** to stop the hub and exit cleanly.

mod config;
mod repl;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use tracing::{error, warn};

use shub_hal::{SimHub, SimStorage};
use shub_kernel::{FileDumpStore, SensorHub};
use shub_middleware::{EventBus, Topic, TopicReceiver};
use shub_types::{BoardConfig, Notification};

fn main() {
    let _tracing = shub_runtime::init_tracing("shub");

    print_banner();

    let cfg = match config::load_or_init() {
        Ok(cfg) => {
            println!(
                "  Board config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            BoardConfig::default()
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build the Tokio runtime");
            return;
        }
    };
    // Background tasks (event pump, supervisor, health, self-check) run on
    // the runtime's workers while the REPL blocks this thread.
    let _enter = runtime.enter();

    let bus = Arc::new(EventBus::default());
    runtime.spawn(print_notifications(bus.subscribe_to(Topic::HubStatus)));
    runtime.spawn(print_notifications(bus.subscribe_to(Topic::Diagnostics)));

    let sim = SimHub::builder()
        .with_motion_sensors()
        .with_environment_sensors()
        .with_firmware_version(0x0102)
        .build();
    let dump_dir = cfg
        .dump_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("shub-dumps"));
    let hub = match SensorHub::builder()
        .with_config(cfg)
        .with_sim(sim.clone())
        .with_storage(Arc::new(SimStorage::new(true, Vec::new())))
        .with_notifier(bus.clone())
        .with_dump_store(Arc::new(FileDumpStore::new(dump_dir)))
        .build()
    {
        Ok(hub) => hub,
        Err(e) => {
            error!(error = %e, "failed to assemble the hub");
            return;
        }
    };

    print!("\n  Starting hub … ");
    match runtime.block_on(hub.start()) {
        Ok(()) => println!("{} ({} sensors probed)", "online".green(), hub.probe_bitmap().count_ones()),
        Err(e) => {
            println!("{}", "failed".red());
            error!(error = %e, "hub start failed");
            return;
        }
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    let hub_for_ctrlc = hub.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the hub …".yellow().bold());
        hub_for_ctrlc.stop();
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    let console = repl::Console {
        runtime: runtime.handle().clone(),
        #[cfg(feature = "self-check")]
        engine: shub_runtime::SelfCheckEngine::new(hub.clone()),
        hub: hub.clone(),
        sim,
    };
    repl::run(&console, shutdown);

    hub.stop();
}

async fn print_notifications(mut rx: TopicReceiver) {
    while let Some(event) = rx.recv().await {
        let line = match &event.payload {
            Notification::ResetOccurred { reason } => {
                format!("hub reset ({reason})").yellow()
            }
            Notification::SuspendStatusChanged(status) => format!("suspend status → {status:?}").normal(),
            Notification::DumpCaptured { reason, path } => {
                format!("dump captured for {reason}: {path}").yellow()
            }
            Notification::SelfCheckComplete { passed, failed } if *failed == 0 => {
                format!("self-check finished: {passed} passed").green()
            }
            Notification::SelfCheckComplete { passed, failed } => {
                format!("self-check finished: {passed} passed, {failed} failed").red()
            }
        };
        println!("\n  {} {}", "●".bold(), line);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   _____ __  __      __"#.bold().cyan());
    println!("{}", r#"  / ___// / / /_  __/ /_"#.bold().cyan());
    println!("{}", r#"  \__ \/ /_/ / / / / __ \"#.bold().cyan());
    println!("{}", r#" ___/ / __  / /_/ / /_/ /"#.bold().cyan());
    println!("{}", r#"/____/_/ /_/\__,_/_.___/"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "shub".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Sensor hub supervisor console");
    println!();
}
