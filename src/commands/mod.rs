//! Command handlers
//!
//! Each command handler orchestrates the execution of a CLI command.

pub mod events;
pub mod query;
pub mod scan;
pub mod snapshot;

pub use events::run_events;
pub use query::run_query;
pub use scan::run_scan;
pub use snapshot::run_snapshot;
