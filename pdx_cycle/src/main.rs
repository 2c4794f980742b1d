//! # PDX Cycle
//!
//! Fixed-period process-data exchange against the simulated fieldbus built
//! from the configured slaves. Writes the configured output byte every
//! cycle and logs link / exchange state changes.

use clap::Parser;
use pdx_common::config::EngineConfig;
use pdx_common::consts::DEFAULT_CONFIG_PATH;
use pdx_cycle::rt::RtSettings;
use pdx_cycle::{Application, ConstantWriter, CycleContext, MonotonicClock, TracingSink, setup};
use pdx_sim::SimulatedLibrary;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// PDX Cycle: cyclic process-data exchange engine
#[derive(Parser, Debug)]
#[command(name = "pdx_cycle")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Fixed-period fieldbus process-data exchange")]
struct Args {
    /// Path to the engine configuration TOML.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Stop after this many cycles (default: run until SIGINT/SIGTERM/SIGHUP).
    #[arg(long)]
    cycles: Option<u64>,

    /// CPU core to pin the RT thread to (overrides config).
    #[arg(long)]
    cpu_core: Option<usize>,

    /// SCHED_FIFO priority (overrides config).
    #[arg(long)]
    rt_priority: Option<i32>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = EngineConfig::load_validated(&args.config);
    setup_tracing(
        &args,
        config.as_ref().ok().map(|c| c.shared.log_level.as_tracing()),
    );

    info!("PDX Cycle v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = match config {
        Ok(config) => run(&args, config),
        Err(e) => Err(e.into()),
    };
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("PDX Cycle shutdown complete");
}

fn run(args: &Args, config: EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Config OK: service={}, period={}ns, slaves={}, entries={}",
        config.shared.service_name,
        config.cycle.period_ns(),
        config.slaves.len(),
        config.entry_count()
    );

    let mut rt = RtSettings::from_config(&config.cycle);
    if let Some(core) = args.cpu_core {
        rt.cpu_core = core;
    }
    if let Some(priority) = args.rt_priority {
        rt.priority = priority;
    }
    rt.apply()?;

    let mut library = SimulatedLibrary::from_config(&config);
    let mut engine = setup(&mut library, &config, MonotonicClock, TracingSink::new())?;

    let mut app: Box<dyn Application> = match &config.application {
        Some(app_cfg) => {
            let writer = ConstantWriter::from_config(&config, engine.offsets()).ok_or_else(|| {
                format!(
                    "application entry 0x{:04X}:{} not registered",
                    app_cfg.index, app_cfg.subindex
                )
            })?;
            info!(
                "Writing 0x{:02X} to byte {} every cycle",
                writer.value(),
                writer.offset()
            );
            Box::new(writer)
        }
        None => {
            warn!("No [application] configured; exchanging without writing outputs");
            Box::new(Passive)
        }
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let c = cancel.clone();
    ctrlc::set_handler(move || {
        c.store(true, Ordering::Release);
    })?;

    let stats = engine.run_until(app.as_mut(), &cancel, args.cycles)?;

    info!(
        "Final: {} cycles, avg={}us, max={}us, max_latency={}us, overruns={}, degraded={}",
        stats.cycle_count,
        stats.avg_cycle_ns() / 1000,
        stats.max_cycle_ns / 1000,
        stats.max_latency_ns / 1000,
        stats.overruns,
        stats.degraded_cycles
    );
    Ok(())
}

/// Leaves the process image untouched.
struct Passive;

impl Application for Passive {
    fn exchange(&mut self, _ctx: &mut CycleContext<'_>) {}
}

/// `-v` wins over `[shared] log_level`; INFO if the config failed to load.
fn default_level(verbose: bool, configured: Option<Level>) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        configured.unwrap_or(Level::INFO)
    }
}

fn setup_tracing(args: &Args, configured: Option<Level>) {
    let level = default_level(args.verbose, configured);
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
