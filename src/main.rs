//! nvhealth - GPU health telemetry tool
//!
//! Decodes nvidia-smi output into normalized readings, scans it for hardware
//! anomalies and streams NVML fault events.

use clap::Parser;
use nvhealth::cli::args::{generate_completions, Cli, Commands};
use nvhealth::commands::{run_events, run_query, run_scan, run_snapshot};
use nvhealth::config::{Config, ConfigBuilder};
use nvhealth::error::{AppError, NvmlError, SmiError};

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();
    let config = build_config(&cli);

    // Set log level based on verbose flag
    if config.general.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    let result = run(&cli, &config);

    if let Err(e) = result {
        log::error!("{}", e);
        print_error(&e);
        std::process::exit(1);
    }
}

fn build_config(cli: &Cli) -> Config {
    let (wait_timeout_ms, queue_capacity) = match &cli.command {
        Commands::Events(args) => (args.wait_timeout_ms, args.queue_capacity),
        _ => (None, None),
    };

    ConfigBuilder::new()
        .with_file(cli.config.as_deref())
        .with_verbose(cli.verbose.then_some(true))
        .with_smi_binary(cli.smi_binary.clone())
        .with_wait_timeout_ms(wait_timeout_ms)
        .with_event_queue_capacity(queue_capacity)
        .build()
}

fn run(cli: &Cli, config: &Config) -> Result<(), AppError> {
    match &cli.command {
        Commands::Query(args) => run_query(args, cli.format, config),

        Commands::Scan(args) => run_scan(args, cli.format, config),

        Commands::Snapshot => run_snapshot(cli.format, config),

        Commands::Events(args) => run_events(args, cli.format, config),

        Commands::Completions { shell } => {
            generate_completions(*shell);
            Ok(())
        }
    }
}

fn print_error(err: &AppError) {
    eprintln!("Error: {}", err);

    // Print helpful hints for common errors
    match err {
        AppError::Nvml(NvmlError::LibraryNotFound) => {
            eprintln!();
            eprintln!("Hint: Make sure the NVIDIA driver is installed.");
            eprintln!("      On Linux, install the nvidia-utils package.");
        }
        AppError::Nvml(NvmlError::InsufficientPermissions(_)) => {
            eprintln!();
            eprintln!("Hint: Try running with sudo or as root.");
        }
        AppError::Smi(SmiError::NotFound(binary)) => {
            eprintln!();
            eprintln!("Hint: '{}' must be on PATH.", binary);
            eprintln!("      Use --smi-binary to point at another location.");
        }
        _ => {}
    }
}
