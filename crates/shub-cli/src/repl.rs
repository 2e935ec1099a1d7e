//! REPL – operator console for a running hub.
//!
//! Supported slash-commands:
//!   /help                               – show this list
//!   /status                             – phase, counters, enabled sensors
//!   /enable <sensor> <period> [latency] – enable or re-arm a sensor (ms)
//!   /disable <sensor>                   – disable a sensor
//!   /flush <sensor>                     – request a flush marker
//!   /reset                              – operator-initiated hub reset
//!   /silence <sensor> on|off            – (sim) stop a sensor's events
//!   /selfcheck [delay_us,iterations]    – run a self-check campaign
//!   /baseline [delay_us,iterations]     – reset first, then self-check
//!   /report                             – last self-check report
//!   /dump                               – last captured memory dump
//!   /config                             – print the active board config
//!   /quit | /exit                       – gracefully exit the CLI

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use shub_hal::SimHub;
use shub_kernel::SensorHub;
use shub_types::{ResetReason, SensorConfig, SensorType, sensors_in};
use tokio::runtime::Handle;

#[cfg(feature = "self-check")]
use shub_runtime::SelfCheckEngine;

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Enable {
        sensor: String,
        period_ms: u32,
        latency_ms: u32,
    },
    Disable(String),
    Flush(String),
    Reset,
    Silence {
        sensor: String,
        on: bool,
    },
    SelfCheck(String),
    Baseline(String),
    Report,
    Dump,
    Config,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let head = words.next().ok_or_else(|| "empty command".to_string())?;
        let args: Vec<&str> = words.collect();
        let sensor_arg = |usage: &str| -> Result<String, String> {
            args.first()
                .map(|s| s.to_string())
                .ok_or_else(|| format!("usage: {usage}"))
        };

        match head {
            "/help" => Ok(Self::Help),
            "/status" => Ok(Self::Status),
            "/enable" => {
                let usage = "/enable <sensor> <period_ms> [latency_ms]";
                let sensor = sensor_arg(usage)?;
                let period_ms = args
                    .get(1)
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| format!("usage: {usage}"))?;
                let latency_ms = match args.get(2) {
                    Some(v) => v.parse().map_err(|_| format!("bad latency '{v}'"))?,
                    None => 0,
                };
                Ok(Self::Enable {
                    sensor,
                    period_ms,
                    latency_ms,
                })
            }
            "/disable" => sensor_arg("/disable <sensor>").map(Self::Disable),
            "/flush" => sensor_arg("/flush <sensor>").map(Self::Flush),
            "/reset" => Ok(Self::Reset),
            "/silence" => {
                let usage = "/silence <sensor> on|off";
                let sensor = sensor_arg(usage)?;
                let on = match args.get(1).copied() {
                    Some("on") | None => true,
                    Some("off") => false,
                    Some(_) => return Err(format!("usage: {usage}")),
                };
                Ok(Self::Silence { sensor, on })
            }
            "/selfcheck" => Ok(Self::SelfCheck(args.join(""))),
            "/baseline" => Ok(Self::Baseline(args.join(""))),
            "/report" => Ok(Self::Report),
            "/dump" => Ok(Self::Dump),
            "/config" => Ok(Self::Config),
            "/quit" | "/exit" => Ok(Self::Quit),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}

/// Everything the console acts on.
pub struct Console {
    pub runtime: Handle,
    pub hub: SensorHub,
    pub sim: SimHub,
    #[cfg(feature = "self-check")]
    pub engine: SelfCheckEngine,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(console: &Console, shutdown: Arc<AtomicBool>) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{}: {}", "Terminal error".red(), e);
            return;
        }
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let line = match editor.readline("shub> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line);

        match Command::parse(line) {
            Ok(Command::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Ok(command) => console.execute(command),
            Err(e) => println!(
                "{} {}. Type {} for available commands.",
                "Error:".red(),
                e,
                "/help".bold()
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

impl Console {
    fn execute(&self, command: Command) {
        match command {
            Command::Help => cmd_help(),
            Command::Status => self.cmd_status(),
            Command::Enable {
                sensor,
                period_ms,
                latency_ms,
            } => self.with_sensor(&sensor, |sensor| {
                let config = SensorConfig::new(period_ms, latency_ms);
                self.report(self.runtime.block_on(self.hub.enable_sensor(sensor, config)))
            }),
            Command::Disable(sensor) => self.with_sensor(&sensor, |sensor| {
                self.report(self.runtime.block_on(self.hub.disable_sensor(sensor)))
            }),
            Command::Flush(sensor) => self.with_sensor(&sensor, |sensor| {
                self.report(self.runtime.block_on(self.hub.flush(sensor)))
            }),
            Command::Reset => {
                println!("  Resetting hub …");
                self.report(self.runtime.block_on(self.hub.reset(ResetReason::KernelSysfs)));
            }
            Command::Silence { sensor, on } => self.with_sensor(&sensor, |sensor| {
                self.sim.set_silent(sensor, on);
                println!(
                    "  {} {}",
                    self.hub.registry().name_of(sensor).bold(),
                    if on { "silenced".yellow() } else { "talking again".green() }
                );
            }),
            Command::SelfCheck(args) => self.cmd_selfcheck(&args),
            Command::Baseline(args) => self.cmd_baseline(&args),
            Command::Report => self.cmd_report(),
            Command::Dump => match self.hub.last_dump() {
                Some(dump) => println!(
                    "  {} dump, {} bytes, {} at {}",
                    dump.reason.to_string().bold(),
                    dump.size,
                    dump.taken_at.format("%Y-%m-%d %H:%M:%S"),
                    dump.location.dimmed()
                ),
                None => println!("  No dump captured yet."),
            },
            Command::Config => match toml::to_string_pretty(self.hub.config()) {
                Ok(raw) => println!("{raw}"),
                Err(e) => println!("{}: {}", "Error".red(), e),
            },
            Command::Quit => {}
        }
    }

    fn with_sensor(&self, name: &str, f: impl FnOnce(SensorType)) {
        match self.hub.registry().lookup(name) {
            Some(sensor) => f(sensor),
            None => println!("{} unknown sensor '{}'", "Error:".red(), name.yellow()),
        }
    }

    fn report<E: std::fmt::Display>(&self, result: Result<(), E>) {
        match result {
            Ok(()) => println!("  {}", "ok".green()),
            Err(e) => println!("  {} {}", "failed:".red(), e),
        }
    }

    fn cmd_status(&self) {
        let status = self.hub.status();
        println!();
        println!("{}", format!("Hub '{}'", status.board).bold().underline());
        println!("  phase      : {:?}", status.phase);
        println!(
            "  firmware   : {}",
            status
                .firmware_version
                .map(|v| format!("{v:#x}"))
                .unwrap_or_else(|| "unknown".to_string())
        );
        println!("  probed     : {}", names(self, status.probe_bitmap));
        println!(
            "  counters   : reset {} timeout {} com_fail {} no_event {}",
            status.counters.reset,
            status.counters.timeout,
            status.counters.com_fail,
            status.counters.no_event_reset
        );
        if let Some(last) = &status.last_reset {
            println!(
                "  last reset : {} at {}",
                last.reason.to_string().yellow(),
                last.wall_clock.format("%H:%M:%S")
            );
        }
        if status.campaign_active {
            println!("  {}", "self-check campaign in progress".yellow());
        }
        for s in &status.sensors {
            println!(
                "  {:<28} {:>5} ms / {:>5} ms  silent {:>6} ms  {}",
                s.name.bold(),
                s.config.sampling_period_ms,
                s.config.max_latency_ms,
                s.silent_for_ms,
                s.last_sample.as_deref().unwrap_or("-").dimmed()
            );
        }
        println!();
    }

    #[cfg(feature = "self-check")]
    fn cmd_selfcheck(&self, args: &str) {
        let _enter = self.runtime.enter();
        match self.engine.write_request(args) {
            Ok(_) => println!(
                "  Self-check started; {} shows the result when it finishes.",
                "/report".bold()
            ),
            Err(e) => println!("  {} {}", "refused:".red(), e),
        }
    }

    #[cfg(feature = "self-check")]
    fn cmd_baseline(&self, args: &str) {
        let _enter = self.runtime.enter();
        let request = args.parse().unwrap_or_default();
        match self.engine.request_baseline_check(request) {
            Ok(_) => println!("  Baseline reset issued; self-check follows."),
            Err(e) => println!("  {} {}", "refused:".red(), e),
        }
    }

    #[cfg(feature = "self-check")]
    fn cmd_report(&self) {
        match self.engine.last_report() {
            Some(report) => print!("{report}"),
            None => println!("  No self-check has finished yet."),
        }
    }

    #[cfg(not(feature = "self-check"))]
    fn cmd_selfcheck(&self, _args: &str) {
        println!("  {} {}", "refused:".red(), shub_runtime::SelfCheckError::Disabled);
    }

    #[cfg(not(feature = "self-check"))]
    fn cmd_baseline(&self, args: &str) {
        self.cmd_selfcheck(args);
    }

    #[cfg(not(feature = "self-check"))]
    fn cmd_report(&self) {
        self.cmd_selfcheck("");
    }
}

fn names(console: &Console, bitmap: u64) -> String {
    let names: Vec<String> = sensors_in(bitmap)
        .map(|s| console.hub.registry().name_of(s))
        .collect();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}

fn cmd_help() {
    println!();
    println!("{}", "Sensor Hub Commands".bold().underline());
    println!("  {}  – phase, counters, enabled sensors", "/status".bold().cyan());
    println!("  {}  – enable or re-arm (ms)", "/enable <sensor> <period> [latency]".bold().cyan());
    println!("  {}  – disable a sensor", "/disable <sensor>".bold().cyan());
    println!("  {}  – request a flush marker", "/flush <sensor>".bold().cyan());
    println!("  {}  – reset the hub", "/reset".bold().cyan());
    println!("  {}  – (sim) stop a sensor's events", "/silence <sensor> on|off".bold().cyan());
    println!("  {}  – run a self-check", "/selfcheck [delay_us,iterations]".bold().cyan());
    println!("  {}  – reset, then self-check", "/baseline [delay_us,iterations]".bold().cyan());
    println!("  {}  – last self-check report", "/report".bold().cyan());
    println!("  {}  – last captured dump", "/dump".bold().cyan());
    println!("  {}  – active board config", "/config".bold().cyan());
    println!("  {}  – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}
