//! CLI argument definitions using clap derive
//!
//! Defines all command-line arguments and subcommands.

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// GPU health telemetry tool
///
/// Decode nvidia-smi output into normalized readings, scan for hardware
/// anomalies and stream NVML fault events.
#[derive(Parser, Debug)]
#[command(name = "nvhealth")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "NVHEALTH_CONFIG")]
    pub config: Option<String>,

    /// nvidia-smi binary name or path
    #[arg(long, global = true)]
    pub smi_binary: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode nvidia-smi output and print normalized readings
    Query(QueryArgs),

    /// Scan for hardware anomalies and wait briefly for a fault event
    Scan(ScanArgs),

    /// Query every metric of every device through NVML
    Snapshot,

    /// Stream NVML fault events
    Events(EventsArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments for the query command
#[derive(Parser, Debug)]
pub struct QueryArgs {
    /// Print the decoded document instead of normalized readings
    #[arg(long)]
    pub document: bool,

    /// Skip the summary invocation
    #[arg(long)]
    pub no_summary: bool,
}

/// Arguments for the scan command
#[derive(Parser, Debug)]
pub struct ScanArgs {
    /// Seconds to wait for a fault event (0 skips the event check)
    #[arg(long, default_value = "7")]
    pub event_wait: u64,
}

/// Arguments for the events command
#[derive(Parser, Debug)]
pub struct EventsArgs {
    /// Stop after this many seconds
    #[arg(short, long)]
    pub duration: Option<u64>,

    /// Stop after this many events
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Event wait timeout in milliseconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub wait_timeout_ms: Option<u64>,

    /// Capacity of the event queue
    #[arg(long)]
    pub queue_capacity: Option<usize>,
}

/// Output format
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for machine parsing
    Json,
    /// YAML format
    Yaml,
}

/// Generate shell completions and print to stdout
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_query() {
        let args = Cli::try_parse_from(["nvhealth", "query", "--no-summary"]).unwrap();
        if let Commands::Query(q) = args.command {
            assert!(q.no_summary);
            assert!(!q.document);
        } else {
            panic!("Expected Query command");
        }
    }

    #[test]
    fn test_cli_parse_verbose_and_format() {
        let args = Cli::try_parse_from(["nvhealth", "-v", "--format", "yaml", "snapshot"]).unwrap();
        assert!(args.verbose);
        assert_eq!(args.format, OutputFormat::Yaml);
        assert!(matches!(args.command, Commands::Snapshot));
    }

    #[test]
    fn test_cli_parse_scan_default_wait() {
        let args = Cli::try_parse_from(["nvhealth", "scan"]).unwrap();
        if let Commands::Scan(scan) = args.command {
            assert_eq!(scan.event_wait, 7);
        } else {
            panic!("Expected Scan command");
        }
    }

    #[test]
    fn test_cli_parse_events() {
        let args = Cli::try_parse_from([
            "nvhealth",
            "events",
            "--duration",
            "30",
            "-n",
            "5",
            "--wait-timeout-ms",
            "1000",
        ])
        .unwrap();
        if let Commands::Events(ev) = args.command {
            assert_eq!(ev.duration, Some(30));
            assert_eq!(ev.count, Some(5));
            assert_eq!(ev.wait_timeout_ms, Some(1000));
            assert_eq!(ev.queue_capacity, None);
        } else {
            panic!("Expected Events command");
        }
    }

    #[test]
    fn test_cli_events_zero_timeout_rejected() {
        let result = Cli::try_parse_from(["nvhealth", "events", "--wait-timeout-ms", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_smi_binary_global() {
        let args =
            Cli::try_parse_from(["nvhealth", "query", "--smi-binary", "/opt/bin/nvidia-smi"])
                .unwrap();
        assert_eq!(args.smi_binary.as_deref(), Some("/opt/bin/nvidia-smi"));
    }
}
