//! Line rewriting for the verbose query output
//!
//! The tool's verbose mode prints an indentation-based tree that is *almost*
//! YAML. This module turns it into text the YAML decoder accepts, one line at
//! a time, remembering only the previously emitted line.
//!
//! Rules are evaluated in order and the first match wins:
//!
//! 1. [`Rule::Skip`]: blank (or whitespace-only) lines and banner lines are dropped.
//! 2. [`Rule::DeviceBlock`]: `GPU 00000000:53:00.0` becomes `GPU<n>:` and the
//!    original text is emitted as an `ID:` child before the next line.
//! 3. [`Rule::ImplicitSection`]: a line without a colon gets one appended.
//! 4. [`Rule::NullLiteral`]: a trailing `None` value becomes `null`.
//! 5. [`Rule::Denest`]: the ad hoc double indentation under HW slowdown flags
//!    and process ids is flattened onto the parent's level.

/// Prefix of a device-block line (zero-padded PCI domain)
pub const DEVICE_BLOCK_PREFIX: &str = "GPU 00000";

/// Banner markers that never carry data
const BANNER_MARKERS: [&str; 2] = ["===", "NVSMI LOG"];

/// Parent keys whose next line is double-indented by the tool
const DENEST_PARENTS: [&str; 5] = [
    "HW Slowdown",
    "HW Thermal Slowdown",
    "Process ID",
    "Process Type",
    "Process Name",
];

/// Rewrite rule, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Skip,
    DeviceBlock,
    ImplicitSection,
    NullLiteral,
    Denest,
}

impl Rule {
    /// All rules, highest priority first
    pub const ORDERED: [Rule; 5] = [
        Rule::Skip,
        Rule::DeviceBlock,
        Rule::ImplicitSection,
        Rule::NullLiteral,
        Rule::Denest,
    ];

    fn matches(self, line: &str, last_key: &str) -> bool {
        match self {
            Rule::Skip => line.trim().is_empty() || BANNER_MARKERS.iter().any(|m| line.contains(m)),
            Rule::DeviceBlock => line.starts_with(DEVICE_BLOCK_PREFIX),
            Rule::ImplicitSection => !line.contains(':'),
            Rule::NullLiteral => line.trim().ends_with("None"),
            Rule::Denest => DENEST_PARENTS.iter().any(|p| last_key.starts_with(p)),
        }
    }
}

/// Pick the first rule whose guard accepts `line`
pub fn classify(line: &str, last_key: &str) -> Option<Rule> {
    Rule::ORDERED
        .into_iter()
        .find(|rule| rule.matches(line, last_key))
}

/// Leading whitespace width
fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Text before the first colon, trimmed
fn key_of(line: &str) -> &str {
    line.split(':').next().unwrap_or("").trim()
}

/// Single-pass line transducer
#[derive(Debug, Default)]
pub struct LineRewriter {
    lines: Vec<String>,
    last_indent: usize,
    device_cursor: usize,
    pending_id: Option<String>,
}

impl LineRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of device-block lines seen so far
    pub fn devices_seen(&self) -> usize {
        self.device_cursor
    }

    fn last_key(&self) -> &str {
        self.lines.last().map(|l| key_of(l)).unwrap_or("")
    }

    /// Feed one raw line
    pub fn push(&mut self, line: &str) {
        let rule = classify(line, self.last_key());
        if rule == Some(Rule::Skip) {
            return;
        }

        let id_line = self
            .pending_id
            .take()
            .map(|id| format!("{}ID: {}", " ".repeat(indent_of(line)), id));

        let rewritten = match rule {
            Some(Rule::DeviceBlock) => {
                self.pending_id = Some(line.to_string());
                let key = format!("GPU{}:", self.device_cursor);
                self.device_cursor += 1;
                key
            }
            Some(Rule::ImplicitSection) => format!("{}:", line),
            Some(Rule::NullLiteral) => line.replacen("None", "null", 1),
            Some(Rule::Denest) => {
                let prefix = if self.last_key().starts_with("Process ") {
                    "Process "
                } else {
                    ""
                };
                format!("{}{}{}", " ".repeat(self.last_indent), prefix, line.trim())
            }
            Some(Rule::Skip) | None => line.to_string(),
        };

        if let Some(id_line) = id_line {
            self.lines.push(id_line);
        }
        self.last_indent = indent_of(&rewritten);
        self.lines.push(rewritten);
    }

    /// Join the emitted lines
    pub fn finish(self) -> String {
        self.lines.join("\n")
    }
}

/// Rewrite a whole verbose-mode output
pub fn rewrite(input: &str) -> String {
    let mut rewriter = LineRewriter::new();
    for line in input.lines() {
        rewriter.push(line);
    }
    log::debug!(
        "rewrote query output with {} device block(s)",
        rewriter.devices_seen()
    );
    rewriter.finish()
}
