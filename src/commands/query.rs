//! Query command implementation
//!
//! Runs the vendor tool, decodes its verbose output and prints normalized
//! readings for every device.

use crate::cli::args::{OutputFormat, QueryArgs};
use crate::cli::output::{print_output, QueryReport};
use crate::config::Config;
use crate::error::Result;
use crate::smi::SmiCommand;

/// Execute the query command
pub fn run_query(args: &QueryArgs, format: OutputFormat, config: &Config) -> Result<()> {
    let smi = SmiCommand::new(&config.smi);
    let decoded = if args.no_summary {
        smi.query()?
    } else {
        smi.fetch()?
    };

    let decode_error = decoded.error.as_ref().map(|e| e.to_string());
    if let Some(err) = &decode_error {
        log::warn!("query output only partially decoded: {}", err);
    }

    if args.document {
        return print_output(&decoded.value, format);
    }

    let report = QueryReport::from_document(&decoded.value, decode_error);
    for dev in &report.devices {
        for err in &dev.errors {
            log::warn!("{}: {}", dev.id, err);
        }
    }
    print_output(&report, format)
}

#[cfg(test)]
mod tests {
    use crate::cli::output::QueryReport;
    use crate::smi::decode_query_output;

    const QUERY: &str = include_str!("../../tests/fixtures/query_h100.txt");

    #[test]
    fn test_report_from_fixture() {
        let decoded = decode_query_output(QUERY.as_bytes()).unwrap();
        assert!(decoded.is_complete());

        let report = QueryReport::from_document(&decoded.value, None);
        assert_eq!(report.attached_gpus, report.devices.len());
        assert!(report.devices.iter().all(|d| d.temperature.is_some()));
        assert!(report.devices.iter().all(|d| d.errors.is_empty()));
    }
}
