//! Avon demo server - Main entry point
//!
//! Hosts a small simulated world and serves its models over HTTP.

mod demo;

use anyhow::{bail, Result};
use avon_server::{load_config, Avon};
use clap::Parser;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "avon")]
#[command(about = "Lightweight HTTP server for robots and robot simulators")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "avon.toml")]
    config: PathBuf,

    /// Bind address (host:port) for the web server
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Stop after this many simulation steps
    #[arg(long)]
    ticks: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Avon v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = load_config(&args.config)?;

    // Override bind address if specified
    if let Some(bind) = args.bind {
        let Some((host, port)) = bind.rsplit_once(':') else {
            bail!("bind address must be host:port, got {}", bind);
        };
        config.server.host = host.to_string();
        config.server.port = port.parse()?;
    }

    let world = Rc::new(RefCell::new(demo::World::new(config.demo.beams)));
    let mut avon = Avon::init(config.to_server_config());
    demo::install(&mut avon, &world)?;

    let mut running = avon.startup()?;
    info!(address = %running.local_addr(), "Serving demo world");

    let tick = Duration::from_millis(config.demo.tick_ms.max(1));
    let mut steps = 0u64;
    loop {
        let started = Instant::now();
        world.borrow_mut().step(tick);
        running.check();

        steps += 1;
        if args.ticks.is_some_and(|max| steps >= max) {
            break;
        }
        if let Some(rest) = tick.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    running.teardown();
    Ok(())
}
