//! Zoro - reconnaissance task engine
//!
//! CLI entry point for running scans through the engine.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info};

use zoro::cli::{Cli, Command, OutputFormat, ScanArgs, get_log_path};
use zoro::config::Config;
use zoro::domain::TaskOptions;
use zoro::engine::Engine;
use zoro::probe::{COMMON_PORTS, PortProbe, ResolveProbe};
use zoro::report::ScanReport;

const RESOLVE_PRIORITY: i32 = 0;
const PORT_PRIORITY: i32 = 1;
const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_thread_names(true)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

// The engine owns its runtime and blocks on it, so main stays synchronous
fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Scan(args) => cmd_scan(config, &args),
        Command::Config => cmd_config(&config),
    }
}

/// Fold command-line overrides into the loaded configuration
fn apply_overrides(mut config: Config, args: &ScanArgs) -> Result<Config> {
    if let Some(workers) = args.workers {
        config.engine.workers = workers;
    }
    if let Some(mode) = args.mode {
        config.engine.mode = mode;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.engine.timeout_ms = timeout_ms;
    }
    if let Some(retries) = args.retries {
        config.engine.max_retries = retries;
    }
    if let Some(rate) = args.rate {
        config.rate_limit.refill_rate = rate;
    }
    if let Some(burst) = args.burst {
        config.rate_limit.capacity = burst;
    }
    config.validate().context("Invalid scan options")?;
    Ok(config)
}

fn cmd_scan(config: Config, args: &ScanArgs) -> Result<()> {
    debug!(?args, "cmd_scan: called");
    let config = apply_overrides(config, args)?;
    let engine = Engine::new(&config).context("Failed to start engine")?;

    // Leave the attempt timeout room to report a closed port
    let connect_timeout = (config.engine.timeout() / 2).min(MAX_CONNECT_TIMEOUT);

    engine.submit_with(
        ResolveProbe::new(&args.target),
        TaskOptions::new().priority(RESOLVE_PRIORITY).label("resolve"),
    );
    let ports = args.ports.as_deref().unwrap_or(COMMON_PORTS);
    for &port in ports {
        let probe = PortProbe::new(&args.target, port).with_connect_timeout(connect_timeout);
        let label = probe.label();
        engine.submit_with(probe, TaskOptions::new().priority(PORT_PRIORITY).label(label));
    }
    info!(host = %args.target, ports = ports.len(), mode = %engine.mode(), "cmd_scan: submitted probes");

    let started_at = chrono::Utc::now();
    let results = engine.run().context("Scan failed")?;
    let finished_at = chrono::Utc::now();
    let report = ScanReport::new(&args.target, engine.mode(), started_at, finished_at, results);
    engine.shutdown();

    match args.format {
        OutputFormat::Json => println!("{}", report.to_json()?),
        OutputFormat::Text => print!("{}", report.to_text()),
    }
    if let Some(dir) = &args.output {
        let path = report.save(dir).context("Failed to save report")?;
        eprintln!("Report saved to {}", path.display());
    }
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}
