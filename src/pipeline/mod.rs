//! Vendor response ingestion and proposal evaluation pipeline.
//!
//! One check cycle flows through:
//! 1. `MailboxSource::fetch_recent()` — time-boxed mailbox I/O
//! 2. `match_replies()` — vendor matching + duplicate partition
//! 3. `ProposalScorer` — per-reply parse → score → persist, sequential
//! 4. `CheckSummary` — processed / skipped / errored buckets
//!
//! The comparison aggregator runs independently over stored proposals.

pub mod compare;
pub mod matcher;
pub mod orchestrator;
pub mod scorer;

pub use compare::ComparisonAggregator;
pub use matcher::{MatchOutcome, MatchedReply, match_replies};
pub use orchestrator::{CheckSummary, IngestionPipeline, MANUAL_ENTRY_SUGGESTION};
pub use scorer::{IngestError, IngestOutcome, ProcessedProposal, ProposalScorer};
