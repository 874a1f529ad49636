//! `ph-pulse` command-line entrypoint.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::capture::CaptureState;
use crate::clock::MonotonicClock;
use crate::config::PulseConfig;
use crate::event::{RECORD_SIZE, decode_records};
use crate::forwarder::{BatchForwarder, DeviceSource, HttpSink, RecordSource};

/// ph-pulse - meter pulse capture and telemetry forwarder
#[derive(Parser, Debug)]
#[command(name = "ph-pulse")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "ph-pulse.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration and print a summary
    Check,

    /// Read buffered records from a capture device once and print them
    Dump {
        /// Capture device; defaults to `capture.device`
        #[arg(long)]
        device: Option<PathBuf>,
    },

    /// Forward records from a capture device to the telemetry sink
    Forward {
        /// Capture device; defaults to `capture.device`
        #[arg(long)]
        device: Option<PathBuf>,
    },

    /// Drive synthetic edges through an in-process capture session and forward them
    Simulate {
        /// Edge rate in pulses per second
        #[arg(long, default_value = "10")]
        rate_hz: u32,

        /// Number of edges to generate before closing the session
        #[arg(long, default_value = "100")]
        pulses: u64,
    },
}

/// Parse arguments, install logging, and run the selected command.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = PulseConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Check => check(&config),
        Commands::Dump { device } => dump(&config, device_path(&config, device.as_deref())?),
        Commands::Forward { device } => forward(&config, device_path(&config, device.as_deref())?),
        Commands::Simulate { rate_hz, pulses } => simulate(&config, rate_hz, pulses),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn device_path<'a>(config: &'a PulseConfig, flag: Option<&'a Path>) -> Result<&'a Path> {
    match flag.or(config.capture.device.as_deref()) {
        Some(path) => Ok(path),
        None => bail!("no capture device given: pass --device or set capture.device"),
    }
}

fn check(config: &PulseConfig) -> Result<()> {
    let capture = &config.capture;
    let forwarder = &config.forwarder;
    println!("trigger source:   {}", capture.trigger_source);
    println!("buffer capacity:  {} records", capture.buffer_capacity);
    if let Some(device) = &capture.device {
        println!("capture device:   {}", device.display());
    }
    println!("endpoint:         {}", forwarder.endpoint_url);
    println!("batch size:       {} records", forwarder.batch_max_records);
    println!("poll interval:    {:?}", forwarder.poll_interval());
    if forwarder.insecure_skip_tls_verify {
        println!("tls verification: DISABLED (insecure_skip_tls_verify)");
    }
    Ok(())
}

fn dump(config: &PulseConfig, device: &Path) -> Result<()> {
    let file = File::open(device).with_context(|| format!("opening {}", device.display()))?;
    let mut source = DeviceSource::new(file);
    let mut buf = vec![0u8; config.forwarder.batch_max_records * RECORD_SIZE];

    let n = source.read_records(&mut buf)?;
    println!("bytes read: {n} records read: {}", n / RECORD_SIZE);
    for event in decode_records(&buf[..n]) {
        println!("{} {} {}", event.sequence, event.timestamp, event.delta);
    }
    Ok(())
}

fn forward(config: &PulseConfig, device: &Path) -> Result<()> {
    let file = File::open(device).with_context(|| format!("opening {}", device.display()))?;
    let sink = HttpSink::new(&config.forwarder)?;
    info!(
        device = %device.display(),
        endpoint = sink.endpoint(),
        "forwarding capture device"
    );

    let mut forwarder = BatchForwarder::new(
        DeviceSource::new(file),
        sink,
        config.forwarder.batch_max_records,
        config.forwarder.poll_interval(),
    );
    forwarder.run(&AtomicBool::new(false))?;
    Ok(())
}

fn simulate(config: &PulseConfig, rate_hz: u32, pulses: u64) -> Result<()> {
    if rate_hz == 0 {
        bail!("--rate-hz must be positive");
    }
    let period = Duration::from_secs(1) / rate_hz;
    let state = CaptureState::new(config.capture.buffer_capacity, MonotonicClock::new())?;
    let sink = HttpSink::new(&config.forwarder)?;
    info!(
        trigger_source = %config.capture.trigger_source,
        capacity = state.capacity(),
        rate_hz,
        pulses,
        "starting simulated capture session"
    );

    let stop = AtomicBool::new(false);
    let state = &state;
    let stats = std::thread::scope(|scope| -> Result<_> {
        let producer = state.try_producer()?;
        scope.spawn(move || {
            for _ in 0..pulses {
                std::thread::sleep(period);
                producer.on_edge();
            }
            drop(producer);
            state.close();
        });

        let mut forwarder = BatchForwarder::new(
            state.try_exporter()?,
            sink,
            config.forwarder.batch_max_records,
            config.forwarder.poll_interval().min(period * 10),
        );
        Ok(forwarder.run(&stop)?)
    })?;

    if state.evicted() > 0 {
        warn!(evicted = state.evicted(), "records were evicted before they could be forwarded");
    }
    info!(
        produced = state.produced(),
        delivered = stats.records_delivered,
        dropped = stats.records_dropped,
        "simulation finished"
    );
    Ok(())
}
