//! Phase-scoped warning aggregation.
//!
//! Data problems (a dependent xref without a master, an alt-allele group
//! without a reference gene) are expected in real inputs and must not abort a
//! load. Each load phase collects them into a `WarningLog` and emits a single
//! summary at phase end: the total count plus the first few offending keys.

use tracing::warn;

/// How many example keys are retained per warning category.
pub const MAX_EXAMPLES: usize = 10;

/// Counter plus a bounded sample of offending identifiers.
#[derive(Debug, Clone)]
pub struct WarningLog {
    label: String,
    count: u64,
    examples: Vec<String>,
}

impl WarningLog {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            count: 0,
            examples: Vec::new(),
        }
    }

    /// Record one occurrence, keeping the identifier if the sample is not
    /// full yet.
    pub fn note(&mut self, example: impl Into<String>) {
        self.count += 1;
        if self.examples.len() < MAX_EXAMPLES {
            self.examples.push(example.into());
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn examples(&self) -> &[String] {
        &self.examples
    }

    /// Emit the aggregated warning, if anything was recorded.
    pub fn emit(&self) {
        if self.count == 0 {
            return;
        }
        warn!(
            category = %self.label,
            count = self.count,
            examples = ?self.examples,
            "data warnings during load phase"
        );
    }
}
