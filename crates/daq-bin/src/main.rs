//! CLI entry point for one-shot analog input acquisition
//!
//! Creates a task on an NI-DAQmx gRPC device server, binds one voltage
//! channel (or a channel range), acquires one finite block of samples and
//! releases the task, whatever happens along the way.
//!
//! # Usage
//!
//! ```bash
//! daq-ai-read localhost:31763 Dev1/ai0
//! daq-ai-read pxi-chassis:31763 Dev1/ai0:3 --sample-rate 5000 -v
//! daq-ai-read --mock localhost Dev1/ai0
//! ```
//!
//! Acquisition parameters come from built-in defaults, an optional TOML file
//! (`--config`), `DAQ_ACQ_*` environment variables and finally the override
//! flags below, in increasing precedence.

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod logging;

use std::f64::consts::TAU;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use daq_client::{
    AcquisitionConfig, DaqmxApi, DeviceAddress, GrpcDaqmx, MockDaqmx, RemoteSession,
    SampleBuffer,
};
use tracing::info;

use logging::{LogConfig, LogFormat};

#[derive(Parser)]
#[command(name = "daq-ai-read")]
#[command(about = "Acquire one block of analog input samples from an NI-DAQmx gRPC device server", long_about = None)]
struct Cli {
    /// Device server address (host:port or URL; default port 31763)
    target: String,

    /// Physical channel(s), e.g. Dev1/ai0 or Dev1/ai0:3
    physical_channel: String,

    /// Acquisition configuration file (TOML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fixed task name instead of a generated unique one
    #[arg(long)]
    session_name: Option<String>,

    /// Lower bound of the expected input range in volts
    #[arg(long, allow_negative_numbers = true)]
    min_val: Option<f64>,

    /// Upper bound of the expected input range in volts
    #[arg(long, allow_negative_numbers = true)]
    max_val: Option<f64>,

    /// Sample clock rate in Hz
    #[arg(long)]
    sample_rate: Option<f64>,

    /// Samples per channel to acquire
    #[arg(long)]
    samples_per_channel: Option<u32>,

    /// Read timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Use the in-process simulated device server; the target is not contacted
    #[arg(long)]
    mock: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    fn apply_overrides(&self, config: &mut AcquisitionConfig) -> Result<()> {
        if let Some(name) = &self.session_name {
            config.session_name = Some(name.clone());
        }
        if let Some(min_val) = self.min_val {
            config.min_val = min_val;
        }
        if let Some(max_val) = self.max_val {
            config.max_val = max_val;
        }
        if let Some(rate) = self.sample_rate {
            config.sample_rate = rate;
        }
        if let Some(samples) = self.samples_per_channel {
            config.samples_per_channel = samples;
        }
        if let Some(timeout) = self.timeout {
            config.read_timeout = Duration::try_from_secs_f64(timeout)
                .with_context(|| format!("Invalid read timeout: {timeout}"))?;
        }
        config.validate()?;
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogConfig::from_verbosity(cli.verbose).with_format(cli.log_format))?;

    let mut config = AcquisitionConfig::load(cli.config.as_deref())
        .context("Failed to load acquisition configuration")?;
    cli.apply_overrides(&mut config)?;

    let samples = if cli.mock {
        info!("Using simulated device server");
        acquire(MockDaqmx::new().with_waveform(simulated_signal), &cli.physical_channel, config)?
    } else {
        let address = DeviceAddress::parse(&cli.target)?;
        let api = GrpcDaqmx::connect(&address)
            .with_context(|| format!("Failed to connect to device server at {address}"))?;
        acquire(api, &cli.physical_channel, config)?
    };

    println!("Read {} Samples.", samples.len());
    if let Some(first) = samples.first() {
        println!("First data point: {first}");
    }

    Ok(())
}

/// Configure, start and read one block; the task is released on every path.
fn acquire<A: DaqmxApi>(
    api: A,
    physical_channel: &str,
    config: AcquisitionConfig,
) -> daq_client::Result<SampleBuffer> {
    RemoteSession::scoped(api, physical_channel, config, |session| {
        session.configure()?;
        session.start()?;
        let samples = session.read()?;
        info!(
            session = session.name(),
            channels = samples.num_channels(),
            samples_per_channel = samples.samples_per_channel(),
            "Acquisition complete"
        );
        Ok(samples)
    })
}

/// 10 Hz sine around mid-scale, phase-shifted per channel.
fn simulated_signal(channel: usize, index: u64) -> f64 {
    let t = index as f64 / 1000.0;
    5.0 + 2.5 * (TAU * 10.0 * t + channel as f64).sin()
}
