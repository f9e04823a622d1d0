//! Ingestion orchestrator — the check-responses cycle and manual entry.
//!
//! One external call drives one cycle: fetch (raced against a timeout) →
//! match → score sequentially → summarize. Only a missing RFP or a
//! storage fault before iteration aborts the operation; everything after
//! that degrades into the summary's skipped/error buckets. A fetch
//! timeout is a soft outcome that points at manual entry, not an error.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{DuplicatePolicy, PipelineConfig};
use crate::error::PipelineError;
use crate::extract::ExtractionService;
use crate::mailbox::MailboxSource;
use crate::pipeline::matcher::match_replies;
use crate::pipeline::scorer::{IngestError, IngestOutcome, ProcessedProposal, ProposalScorer};
use crate::store::Database;

/// Fallback guidance attached to soft failures.
pub const MANUAL_ENTRY_SUGGESTION: &str =
    "Add the proposal manually via the manual proposal endpoint.";

/// Summary of one check-responses cycle. Always a successful outcome at
/// the transport level, even when nothing could be processed.
#[derive(Debug, Serialize)]
pub struct CheckSummary {
    pub message: String,
    pub proposals: Vec<ProcessedProposal>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<IngestError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl CheckSummary {
    fn timed_out(secs: u64) -> Self {
        Self {
            message: format!(
                "Mailbox check timed out after {secs} seconds. \
                 Please add proposals manually instead."
            ),
            proposals: Vec::new(),
            skipped: Vec::new(),
            errors: Vec::new(),
            suggestion: Some(MANUAL_ENTRY_SUGGESTION.to_string()),
        }
    }

    fn empty_mailbox() -> Self {
        Self {
            message: "No new vendor responses found. You can add proposals manually."
                .to_string(),
            proposals: Vec::new(),
            skipped: Vec::new(),
            errors: Vec::new(),
            suggestion: Some(MANUAL_ENTRY_SUGGESTION.to_string()),
        }
    }
}

/// Orchestrates the mailbox-read-and-score cycle for one RFP at a time.
pub struct IngestionPipeline {
    db: Arc<dyn Database>,
    mailbox: Arc<dyn MailboxSource>,
    scorer: ProposalScorer,
    config: PipelineConfig,
}

impl IngestionPipeline {
    pub fn new(
        db: Arc<dyn Database>,
        mailbox: Arc<dyn MailboxSource>,
        extractor: Arc<ExtractionService>,
        config: PipelineConfig,
    ) -> Self {
        let scorer = ProposalScorer::new(extractor, Arc::clone(&db));
        Self {
            db,
            mailbox,
            scorer,
            config,
        }
    }

    /// Run one ingestion cycle for an RFP.
    ///
    /// Errors only before iteration begins (unknown RFP, storage fault);
    /// per-reply failures land in the summary's error bucket.
    pub async fn check_responses(&self, rfp_id: Uuid) -> Result<CheckSummary, PipelineError> {
        let rfp = self
            .db
            .get_rfp(rfp_id)
            .await?
            .ok_or(PipelineError::RfpNotFound(rfp_id))?;
        let invited = self.db.list_invited_vendors(rfp_id).await?;

        info!(rfp = %rfp.title, invited = invited.len(), "Checking for vendor responses");

        let replies = match tokio::time::timeout(
            self.config.fetch_timeout,
            self.mailbox.fetch_recent(),
        )
        .await
        {
            Ok(replies) => replies,
            Err(_) => {
                warn!(
                    timeout_secs = self.config.fetch_timeout.as_secs(),
                    "Mailbox fetch exceeded its budget"
                );
                return Ok(CheckSummary::timed_out(self.config.fetch_timeout.as_secs()));
            }
        };

        if replies.is_empty() {
            return Ok(CheckSummary::empty_mailbox());
        }

        let responded: HashSet<Uuid> = self
            .db
            .list_proposals(rfp_id)
            .await?
            .iter()
            .map(|(p, _)| p.vendor_id)
            .collect();

        let outcome = match_replies(replies, &invited, &responded);
        info!(
            to_process = outcome.matched.len(),
            skipped = outcome.skipped.len(),
            unmatched = outcome.unmatched,
            "Replies matched"
        );

        let mut proposals = Vec::new();
        let mut skipped = outcome.skipped;
        let mut errors = Vec::new();

        for result in self.scorer.ingest_batch(&rfp, outcome.matched).await {
            match result {
                IngestOutcome::Processed(p) => proposals.push(*p),
                IngestOutcome::Skipped(name) => {
                    if !skipped.contains(&name) {
                        skipped.push(name);
                    }
                }
                IngestOutcome::Errored(e) => errors.push(e),
            }
        }

        let message = if !proposals.is_empty() {
            format!("Processed {} new proposal(s)", proposals.len())
        } else if !skipped.is_empty() {
            format!(
                "All proposals from vendors ({}) already exist",
                skipped.join(", ")
            )
        } else {
            "No matching vendor responses found".to_string()
        };
        info!(message = %message, errors = errors.len(), "Response check complete");

        let suggestion =
            (proposals.is_empty() || !errors.is_empty()).then(|| MANUAL_ENTRY_SUGGESTION.to_string());

        Ok(CheckSummary {
            message,
            proposals,
            skipped,
            errors,
            suggestion,
        })
    }

    /// Record a proposal from operator-supplied text, through the exact
    /// same parse → score → persist path as automatic ingestion.
    pub async fn add_manual_proposal(
        &self,
        rfp_id: Uuid,
        vendor_id: Uuid,
        subject: Option<String>,
        body: &str,
    ) -> Result<ProcessedProposal, PipelineError> {
        if body.trim().is_empty() {
            return Err(PipelineError::Validation(
                "email body is required".to_string(),
            ));
        }

        let rfp = self
            .db
            .get_rfp(rfp_id)
            .await?
            .ok_or(PipelineError::RfpNotFound(rfp_id))?;
        let vendor = self
            .db
            .get_vendor(vendor_id)
            .await?
            .ok_or(PipelineError::VendorNotFound(vendor_id))?;

        if self.config.duplicate_policy == DuplicatePolicy::Reject
            && self.db.find_proposal(rfp_id, vendor_id).await?.is_some()
        {
            return Err(PipelineError::DuplicateProposal {
                vendor: vendor.name,
            });
        }

        let subject = subject
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "Manual Proposal".to_string());

        let (proposal, analysis) = self
            .scorer
            .score_and_store(&rfp, &vendor, &subject, body)
            .await?;

        Ok(ProcessedProposal {
            vendor_name: vendor.name,
            proposal,
            analysis,
        })
    }
}
