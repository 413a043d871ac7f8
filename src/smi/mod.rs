//! nvidia-smi output handling
//!
//! Runs the command-line tool and decodes its verbose query output into a
//! typed [`Document`], keeping every reading as the tool printed it.

pub mod command;
pub mod decode;
pub mod document;
pub mod rewrite;
pub mod units;

pub use command::{tool_exists, SmiCommand, SummaryOutcome};
pub use decode::decode_query_output;
pub use document::{
    ClockEventReasons, DeviceRecord, Document, EccAggregate, EccErrors, EccSramSources,
    EccVolatile, FbMemoryUsage, PowerReadings, ProcessList, ProcessRecord, ResetStatus,
    TemperatureReadings,
};
pub use units::{humanize_bytes, parse_bytes, parse_suffixed_scalar, Unit};
