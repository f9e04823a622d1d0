//! Proposal scorer — parse → score → persist for matched replies.
//!
//! Each reply is processed independently; one failure is recorded with
//! its sender address and never stops the rest of the batch. The manual
//! entry path goes through the same `score_and_store`, so automatic and
//! manual proposals are structurally identical.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::error::PipelineError;
use crate::extract::ExtractionService;
use crate::model::{Proposal, ProposalAnalysis, Rfp, Vendor};
use crate::pipeline::matcher::MatchedReply;
use crate::store::Database;

/// A successfully ingested proposal, with the evaluation that scored it.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedProposal {
    pub vendor_name: String,
    pub proposal: Proposal,
    pub analysis: ProposalAnalysis,
}

/// A per-reply failure, keyed by sender address.
#[derive(Debug, Clone, Serialize)]
pub struct IngestError {
    pub from: String,
    pub error: String,
}

/// Outcome of processing one matched reply.
#[derive(Debug)]
pub enum IngestOutcome {
    Processed(Box<ProcessedProposal>),
    Skipped(String),
    Errored(IngestError),
}

/// Runs the parse → score → persist sequence.
pub struct ProposalScorer {
    extractor: Arc<ExtractionService>,
    db: Arc<dyn Database>,
}

impl ProposalScorer {
    pub fn new(extractor: Arc<ExtractionService>, db: Arc<dyn Database>) -> Self {
        Self { extractor, db }
    }

    /// Parse a reply, score it against the RFP, and persist the result.
    ///
    /// Shared by automatic ingestion and manual entry.
    pub async fn score_and_store(
        &self,
        rfp: &Rfp,
        vendor: &Vendor,
        subject: &str,
        body: &str,
    ) -> Result<(Proposal, ProposalAnalysis), PipelineError> {
        info!(vendor = %vendor.name, "Parsing vendor reply");
        let parsed = self.extractor.parse_vendor_reply(body, subject, rfp).await?;
        let analysis = self
            .extractor
            .score_proposal(&parsed, &rfp.requirements)
            .await?;

        let proposal = Proposal::new(rfp.id, vendor.id, subject, body, parsed, &analysis);
        self.db.insert_proposal(&proposal).await?;

        info!(
            vendor = %vendor.name,
            score = proposal.score,
            "Proposal stored"
        );
        Ok((proposal, analysis))
    }

    /// Process matched replies strictly in order, one at a time.
    ///
    /// Sequencing is what keeps dedupe deterministic: a vendor's reply is
    /// fully persisted (or skipped) before the next reply is evaluated.
    pub async fn ingest_batch(&self, rfp: &Rfp, matched: Vec<MatchedReply>) -> Vec<IngestOutcome> {
        let mut outcomes = Vec::with_capacity(matched.len());

        for MatchedReply { reply, vendor } in matched {
            // Pre-check directly against storage: an earlier entry this
            // cycle, or another cycle, may have persisted meanwhile.
            match self.db.find_proposal(rfp.id, vendor.id).await {
                Ok(Some(_)) => {
                    outcomes.push(IngestOutcome::Skipped(vendor.name.clone()));
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(from = %reply.from, error = %e, "Duplicate pre-check failed");
                    outcomes.push(IngestOutcome::Errored(IngestError {
                        from: reply.from.clone(),
                        error: e.to_string(),
                    }));
                    continue;
                }
            }

            match self
                .score_and_store(rfp, &vendor, &reply.subject, &reply.body)
                .await
            {
                Ok((proposal, analysis)) => {
                    outcomes.push(IngestOutcome::Processed(Box::new(ProcessedProposal {
                        vendor_name: vendor.name,
                        proposal,
                        analysis,
                    })));
                }
                Err(e) => {
                    error!(from = %reply.from, error = %e, "Failed to process reply");
                    outcomes.push(IngestOutcome::Errored(IngestError {
                        from: reply.from.clone(),
                        error: e.to_string(),
                    }));
                }
            }
        }

        outcomes
    }
}
