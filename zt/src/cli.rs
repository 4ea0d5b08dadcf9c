//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::engine::Mode;

/// Zoro - reconnaissance task engine
#[derive(Parser)]
#[command(
    name = "zt",
    about = "Zoro reconnaissance toolkit: rate-limited, prioritized probe execution",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve a target and probe its TCP ports
    Scan(ScanArgs),

    /// Print the effective configuration as YAML
    Config,
}

/// Options for `zt scan`; unset values fall back to the configuration
#[derive(Debug, Clone, clap::Args)]
pub struct ScanArgs {
    /// Host name or address to scan
    #[arg(short, long)]
    pub target: String,

    /// Comma-separated ports (defaults to the common port list)
    #[arg(short, long, value_delimiter = ',')]
    pub ports: Option<Vec<u16>>,

    /// Worker count
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Execution mode (pooled, cooperative)
    #[arg(short, long)]
    pub mode: Option<Mode>,

    /// Per-attempt timeout in milliseconds
    #[arg(long = "timeout-ms")]
    pub timeout_ms: Option<u64>,

    /// Re-attempts after a failed probe
    #[arg(short, long)]
    pub retries: Option<u32>,

    /// Probes per second
    #[arg(long)]
    pub rate: Option<f64>,

    /// Probes allowed in a burst
    #[arg(long)]
    pub burst: Option<f64>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Also save the JSON report under this directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

/// Output format for scan reports
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => {
                debug!(%s, "OutputFormat::from_str: unknown format");
                Err(format!("Unknown format: {}. Use: text or json", s))
            }
        }
    }
}

/// Path of the log file written by the binary
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("zoro")
        .join("logs")
        .join("zoro.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_scan() {
        let cli = Cli::parse_from(["zt", "scan", "--target", "example.com"]);
        let Command::Scan(args) = cli.command else {
            panic!("Expected Scan command");
        };
        assert_eq!(args.target, "example.com");
        assert!(args.ports.is_none());
        assert!(args.mode.is_none());
        assert!(args.output.is_none());
        assert_eq!(args.format, OutputFormat::Text);
    }

    #[test]
    fn test_cli_parse_scan_options() {
        let cli = Cli::parse_from([
            "zt",
            "scan",
            "-t",
            "10.0.0.1",
            "--ports",
            "22,80,443",
            "--mode",
            "cooperative",
            "--timeout-ms",
            "250",
            "--retries",
            "2",
            "--rate",
            "50",
            "--format",
            "json",
            "-o",
            "reports",
        ]);
        let Command::Scan(args) = cli.command else {
            panic!("Expected Scan command");
        };
        assert_eq!(args.ports, Some(vec![22, 80, 443]));
        assert_eq!(args.mode, Some(Mode::Cooperative));
        assert_eq!(args.timeout_ms, Some(250));
        assert_eq!(args.retries, Some(2));
        assert_eq!(args.rate, Some(50.0));
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.output, Some(PathBuf::from("reports")));
    }

    #[test]
    fn test_cli_parse_config() {
        let cli = Cli::parse_from(["zt", "config"]);
        assert!(matches!(cli.command, Command::Config));
    }

    #[test]
    fn test_cli_with_global_options() {
        let cli = Cli::parse_from(["zt", "config", "-c", "/path/to/zoro.yml", "-l", "debug"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/zoro.yml")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_cli_rejects_bad_port() {
        assert!(Cli::try_parse_from(["zt", "scan", "-t", "h", "--ports", "70000"]).is_err());
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text)));
        assert!(matches!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_log_path() {
        assert!(get_log_path().ends_with("zoro/logs/zoro.log"));
    }
}
