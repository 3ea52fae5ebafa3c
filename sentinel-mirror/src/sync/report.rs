//! Run reports.

use crate::batch::Platform;
use crate::ledger::StatusHistogram;

/// How the discovery phase of a request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// The catalog was browsed and the new products processed.
    Completed {
        /// Catalog total, now recorded in the ledger.
        total: u64,
        /// New products recorded in the ledger.
        recorded: usize,
        /// New products dropped because the filters do not narrow them.
        dropped: usize,
    },
    /// The catalog could not be browsed. The ledger counter is unchanged.
    Aborted { reason: String },
}

/// Outcome of one sync request.
#[derive(Debug, Clone)]
pub struct RequestReport {
    pub request_id: String,
    pub platform: Platform,
    /// Ledger entries retried during the resume phase.
    pub resumed: usize,
    pub discovery: DiscoveryOutcome,
    /// Ledger status counts at the end of the request.
    pub histogram: StatusHistogram,
}

/// Outcome of a whole batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub completed: Vec<RequestReport>,
    /// Requests that failed, with the reason.
    pub failed: Vec<(String, String)>,
    /// Requests not started because storage was exhausted.
    pub skipped: Vec<String>,
}

impl BatchReport {
    /// Whether every request ran to the end.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}
