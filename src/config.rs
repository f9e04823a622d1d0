//! Pipeline configuration.

use std::time::Duration;

/// What to do when a manual proposal targets a (RFP, vendor) pair that
/// already has a stored proposal.
///
/// The automatic ingestion path always skips such pairs; the manual path
/// makes the choice explicit so operators who need a second record can
/// opt in per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Reject the manual entry with a duplicate error.
    Reject,
    /// Allow the entry through to storage (its uniqueness constraint
    /// still applies).
    Allow,
}

/// Tuning knobs for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Budget for the whole mailbox fetch stage. When exceeded, the check
    /// completes as a soft failure suggesting manual entry.
    pub fetch_timeout: Duration,
    /// How many days back the mailbox search reaches. Older replies are
    /// excluded and must be entered manually.
    pub lookback_days: i64,
    /// Cap on messages examined per cycle (the most recent ones win).
    pub max_messages: usize,
    /// Duplicate handling for the manual-entry path.
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            lookback_days: 2,
            max_messages: 10,
            duplicate_policy: DuplicatePolicy::Reject,
        }
    }
}
