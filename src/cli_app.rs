//! Command-line definition and daemon start-up sequence.

use std::path::PathBuf;

use clap::Parser;
use clap::error::ErrorKind;
use thiserror::Error;

use hddled::core::config::{Config, MIN_POLL_INTERVAL_MS};
use hddled::core::errors::HddError;
use hddled::daemon::loop_main::{RunLoop, ShutdownReason};
use hddled::daemon::pidfile::{PidFile, ensure_not_running};
use hddled::daemon::signals::SignalHandler;
use hddled::indicator::controller::IndicatorController;
use hddled::logger::activity::{ActivityEvent, LoggerConfig, spawn_logger};
use hddled::logger::jsonl::JsonlConfig;
use hddled::monitor::activity::{ActivitySampler, CounterKeys};
use hddled::platform::gpio::GpioPin;
use hddled::platform::vmstat::open_counter_source;

/// Disk-activity LED daemon: lights the LED while pages move in or out.
#[derive(Debug, Parser)]
#[command(name = "hddled", author, version, about, long_about = None)]
pub struct Cli {
    /// Detach from the terminal and run in the background.
    #[arg(short, long)]
    detach: bool,
    /// Poll interval in milliseconds (minimum 10).
    #[arg(
        short,
        long,
        value_name = "MILLISECONDS",
        value_parser = clap::value_parser!(u64).range(MIN_POLL_INTERVAL_MS..)
    )]
    refresh: Option<u64>,
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Override PID file path.
    #[arg(long, value_name = "PATH")]
    pidfile: Option<PathBuf>,
    /// Skip sysfs export and direction setup for a pre-configured pin.
    #[arg(long)]
    no_export: bool,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or environment the operator must fix.
    #[error("{0}")]
    User(String),
    /// Failure while starting or running the daemon.
    #[error("{0}")]
    Runtime(String),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) => 2,
        }
    }
}

impl From<HddError> for CliError {
    fn from(err: HddError) -> Self {
        match err {
            HddError::InvalidConfig { .. }
            | HddError::MissingConfig { .. }
            | HddError::ConfigParse { .. }
            | HddError::AlreadyRunning { .. } => Self::User(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

/// Exit code for a failed argument parse. `--help` and `--version` succeed;
/// any other parse failure is a user error.
pub fn parse_exit_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => CliError::User(String::new()).exit_code(),
    }
}

/// Load the configuration and run the daemon until it stops.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    let config = effective_config(cli)?;

    ensure_not_running(&config.paths.pidfile)?;

    let source = open_counter_source(&config.monitor.counter_source)?;
    let sampler = ActivitySampler::with_keys(
        source,
        CounterKeys {
            pages_in: config.monitor.pages_in_key.clone(),
            pages_out: config.monitor.pages_out_key.clone(),
        },
    );

    let pin = GpioPin::new(&config.indicator.gpio_root, config.indicator.pin);
    let controller = IndicatorController::new(pin.prepare(config.indicator.export)?);

    let signals = SignalHandler::manual();
    let run_loop = RunLoop::init(
        sampler,
        controller,
        config.monitor.poll_interval(),
        signals.clone(),
    )?;

    if cli.detach {
        detach()?;
    }

    // Everything below runs in the daemon process. Hooks must be armed
    // before the PID file exists.
    signals.register_os_hooks();
    let _pidfile = PidFile::create(&config.paths.pidfile)?;

    let logger = spawn_logger(LoggerConfig {
        jsonl_config: JsonlConfig {
            path: config.paths.jsonl_log.clone(),
            ..JsonlConfig::default()
        },
        ..LoggerConfig::default()
    })?;
    let events = logger.handle();
    events.send(ActivityEvent::DaemonStarted {
        version: env!("CARGO_PKG_VERSION").to_string(),
        config_hash: config.stable_hash().unwrap_or_default(),
        poll_interval_ms: config.monitor.poll_interval_ms,
    });

    eprintln!(
        "[HDL-LOOP] started: pin {} every {}ms",
        pin.number(),
        config.monitor.poll_interval_ms
    );

    let outcome = run_loop.with_logger(events).run();
    logger.finish();

    match outcome? {
        ShutdownReason::Signal => Ok(()),
    }
}

/// Defaults, then file, then environment, then command-line flags.
fn effective_config(cli: &Cli) -> Result<Config, CliError> {
    let mut config = Config::load_unvalidated(cli.config.as_deref())?;

    if let Some(ms) = cli.refresh {
        config.monitor.poll_interval_ms = ms;
    }
    if let Some(path) = &cli.pidfile {
        config.paths.pidfile.clone_from(path);
    }
    if cli.no_export {
        config.indicator.export = false;
    }

    config.validate()?;
    Ok(config)
}

#[cfg(unix)]
fn detach() -> Result<(), CliError> {
    daemonize::Daemonize::new()
        .working_directory("/")
        .start()
        .map_err(|e| {
            CliError::from(HddError::Daemonize {
                details: e.to_string(),
            })
        })
}

#[cfg(not(unix))]
fn detach() -> Result<(), CliError> {
    Err(CliError::User(
        "--detach is only supported on Unix systems".to_string(),
    ))
}
