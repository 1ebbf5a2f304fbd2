//! Per-item outcomes collected over one stage run for one country.

use std::fmt;

use chrono::NaiveDate;
use tracing::{info, warn};

/// Why an item was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Output for the date already exists
    AlreadyProcessed,
    /// No date could be parsed from the key
    UnparseableName,
    /// Band labels did not match a known layout
    UnrecognizedBands,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::AlreadyProcessed => "already processed",
            SkipReason::UnparseableName => "unparseable name",
            SkipReason::UnrecognizedBands => "unrecognized band layout",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Processed,
    Skipped(SkipReason),
    Failed(String),
}

/// Outcome for one candidate blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub key: String,
    pub date: Option<NaiveDate>,
    pub outcome: ItemOutcome,
}

/// Item counts by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportCounts {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Every candidate item of a stage run with its outcome.
///
/// Failed dates stay absent from the target store, so the next run picks
/// them up again.
#[derive(Debug, Clone)]
pub struct BatchReport {
    stage: &'static str,
    iso3: String,
    items: Vec<ItemReport>,
    rows_written: u64,
}

impl BatchReport {
    pub fn new(stage: &'static str, iso3: &str) -> Self {
        Self {
            stage,
            iso3: iso3.to_string(),
            items: Vec::new(),
            rows_written: 0,
        }
    }

    pub fn stage(&self) -> &str {
        self.stage
    }

    pub fn iso3(&self) -> &str {
        &self.iso3
    }

    pub fn record(&mut self, key: impl Into<String>, date: Option<NaiveDate>, outcome: ItemOutcome) {
        self.items.push(ItemReport {
            key: key.into(),
            date,
            outcome,
        });
    }

    pub fn processed(&mut self, key: impl Into<String>, date: NaiveDate) {
        self.record(key, Some(date), ItemOutcome::Processed);
    }

    /// Record a skip and log it.
    pub fn skipped(&mut self, key: impl Into<String>, date: Option<NaiveDate>, reason: SkipReason) {
        let key = key.into();
        if reason != SkipReason::AlreadyProcessed {
            warn!(iso3 = %self.iso3, blob = %key, %reason, "Skipping item");
        }
        self.record(key, date, ItemOutcome::Skipped(reason));
    }

    /// Record a failure and log it.
    pub fn failed(&mut self, key: impl Into<String>, date: Option<NaiveDate>, error: impl fmt::Display) {
        let key = key.into();
        let message = error.to_string();
        warn!(iso3 = %self.iso3, blob = %key, error = %message, "Item failed");
        self.record(key, date, ItemOutcome::Failed(message));
    }

    pub fn add_rows_written(&mut self, rows: u64) {
        self.rows_written += rows;
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn items(&self) -> &[ItemReport] {
        &self.items
    }

    pub fn counts(&self) -> ReportCounts {
        let mut counts = ReportCounts::default();
        for item in &self.items {
            match item.outcome {
                ItemOutcome::Processed => counts.processed += 1,
                ItemOutcome::Skipped(_) => counts.skipped += 1,
                ItemOutcome::Failed(_) => counts.failed += 1,
            }
        }
        counts
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, ItemOutcome::Failed(_)))
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Dates recorded as processed, in report order.
    pub fn processed_dates(&self) -> Vec<NaiveDate> {
        self.items
            .iter()
            .filter(|item| item.outcome == ItemOutcome::Processed)
            .filter_map(|item| item.date)
            .collect()
    }

    pub fn log_summary(&self) {
        let counts = self.counts();
        info!(
            stage = self.stage,
            iso3 = %self.iso3,
            processed = counts.processed,
            skipped = counts.skipped,
            failed = counts.failed,
            rows_written = self.rows_written,
            "Stage complete"
        );
    }
}
