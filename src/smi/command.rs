//! Running the vendor command-line tool
//!
//! The tool must be discoverable on `PATH`. Its absence is reported as
//! [`SmiError::NotFound`] so callers can skip GPU checks on hosts without one.

use crate::config::SmiConfig;
use crate::error::{DecodeError, Partial, SmiError};
use crate::smi::decode::decode_query_output;
use crate::smi::document::Document;

use std::path::PathBuf;
use std::process::Command;

/// Marker the tool prints when a device handle cannot be obtained
pub const UNKNOWN_ERROR: &str = "Unknown Error";

/// Default tool binary name
pub const DEFAULT_BINARY: &str = "nvidia-smi";

/// True if the default tool binary is on `PATH`
pub fn tool_exists() -> bool {
    which::which(DEFAULT_BINARY).is_ok()
}

/// Result of the non-verbose summary invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    /// Summary text to scan for error markers
    Text(String),
    /// The tool reported a device failure instead of a summary
    Failure(String),
}

/// Sort a summary invocation into text, device failure, or hard error
pub fn classify_summary(result: Result<Vec<u8>, SmiError>) -> Result<SummaryOutcome, SmiError> {
    match result {
        Ok(stdout) => {
            let text = String::from_utf8_lossy(&stdout).into_owned();
            if text.contains(UNKNOWN_ERROR) {
                Ok(SummaryOutcome::Failure(text))
            } else {
                Ok(SummaryOutcome::Text(text))
            }
        }
        Err(err) => {
            let message = err.to_string();
            if message.contains(UNKNOWN_ERROR) {
                Ok(SummaryOutcome::Failure(message))
            } else {
                Err(err)
            }
        }
    }
}

/// Configured tool invocation
#[derive(Debug, Clone)]
pub struct SmiCommand {
    binary: String,
    query_args: Vec<String>,
    summary_args: Vec<String>,
}

impl SmiCommand {
    pub fn new(config: &SmiConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            query_args: config.query_args.clone(),
            summary_args: config.summary_args.clone(),
        }
    }

    /// Resolve the binary on `PATH`
    pub fn locate(&self) -> Result<PathBuf, SmiError> {
        which::which(&self.binary).map_err(|e| {
            log::debug!("{} lookup failed: {}", self.binary, e);
            SmiError::NotFound(self.binary.clone())
        })
    }

    pub fn exists(&self) -> bool {
        self.locate().is_ok()
    }

    /// Run the tool and return stdout. A non-zero exit carries both streams
    /// in the error so device failure markers stay visible.
    pub fn run(&self, args: &[String]) -> Result<Vec<u8>, SmiError> {
        let path = self.locate()?;
        log::debug!("running {} {}", path.display(), args.join(" "));

        let output = Command::new(&path)
            .args(args)
            .output()
            .map_err(|source| SmiError::Io {
                binary: self.binary.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let mut stderr = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let err_text = String::from_utf8_lossy(&output.stderr);
        if !err_text.trim().is_empty() {
            if !stderr.is_empty() {
                stderr.push('\n');
            }
            stderr.push_str(err_text.trim());
        }
        Err(SmiError::CommandFailed {
            binary: self.binary.clone(),
            status: output.status.to_string(),
            stderr,
        })
    }

    /// Run the verbose query and decode it
    pub fn query(&self) -> Result<Partial<Document, DecodeError>, SmiError> {
        let raw = self.run(&self.query_args)?;
        Ok(decode_query_output(&raw)?)
    }

    /// Query, decode, then attach the summary mode output.
    ///
    /// A degraded decode is still returned; its error travels in the
    /// [`Partial`]. A summary that fails with a device error is recorded on
    /// the document instead of failing the call.
    pub fn fetch(&self) -> Result<Partial<Document, DecodeError>, SmiError> {
        let mut decoded = self.query()?;

        match classify_summary(self.run(&self.summary_args))? {
            SummaryOutcome::Text(text) => decoded.value.summary = text,
            SummaryOutcome::Failure(failure) => {
                log::warn!("{} summary reported a device failure", self.binary);
                decoded.value.summary_failure = Some(failure);
            }
        }

        Ok(decoded)
    }
}

impl Default for SmiCommand {
    fn default() -> Self {
        Self::new(&SmiConfig::default())
    }
}
