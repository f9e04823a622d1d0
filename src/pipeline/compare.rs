//! Comparison aggregator — on-demand ranking of all stored proposals
//! for one RFP.
//!
//! Nothing is persisted: a repeated call recomputes the comparison, and
//! with a non-deterministic backend may rank differently. The configured
//! temperatures keep that drift small; it is accepted, not eliminated.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::extract::ExtractionService;
use crate::model::ComparisonReport;
use crate::store::Database;

/// Computes proposal comparisons over already-persisted proposals.
pub struct ComparisonAggregator {
    db: Arc<dyn Database>,
    extractor: Arc<ExtractionService>,
}

impl ComparisonAggregator {
    pub fn new(db: Arc<dyn Database>, extractor: Arc<ExtractionService>) -> Self {
        Self { db, extractor }
    }

    /// Compare all proposals for an RFP and recommend a vendor.
    ///
    /// Requires the RFP and at least one stored proposal.
    pub async fn compare(&self, rfp_id: Uuid) -> Result<ComparisonReport, PipelineError> {
        let rfp = self
            .db
            .get_rfp(rfp_id)
            .await?
            .ok_or(PipelineError::RfpNotFound(rfp_id))?;

        let proposals = self.db.list_proposals(rfp_id).await?;
        if proposals.is_empty() {
            return Err(PipelineError::NoProposals(rfp_id));
        }

        info!(
            rfp = %rfp.title,
            proposals = proposals.len(),
            "Generating comparison"
        );
        let comparison = self.extractor.compare_proposals(&proposals, &rfp).await?;

        Ok(ComparisonReport {
            rfp,
            proposals,
            comparison,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    use crate::extract::testing::MockBackend;
    use crate::model::{
        ParsedProposal, Proposal, ProposalAnalysis, Requirements, Rfp, RfpStatus, Vendor,
    };
    use crate::store::LibSqlBackend;

    fn sample_rfp() -> Rfp {
        Rfp {
            id: Uuid::new_v4(),
            title: "Office laptops".into(),
            description: "20 laptops".into(),
            requirements: Requirements::default(),
            budget: None,
            delivery_deadline: None,
            payment_terms: None,
            warranty_terms: None,
            status: RfpStatus::Sent,
            created_at: Utc::now(),
            sent_at: Some(Utc::now()),
        }
    }

    async fn aggregator_with(
        responses: Vec<Result<String, crate::error::ExtractError>>,
    ) -> (ComparisonAggregator, Arc<dyn Database>) {
        let backend = Arc::new(MockBackend::new(responses));
        let extractor = Arc::new(ExtractionService::new(
            backend as Arc<dyn crate::extract::ExtractionBackend>,
        ));
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        (
            ComparisonAggregator::new(Arc::clone(&db), extractor),
            db,
        )
    }

    #[tokio::test]
    async fn no_proposals_is_a_not_found_condition() {
        let (aggregator, db) = aggregator_with(vec![]).await;
        let rfp = sample_rfp();
        db.insert_rfp(&rfp).await.unwrap();

        let err = aggregator.compare(rfp.id).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoProposals(_)));
    }

    #[tokio::test]
    async fn unknown_rfp_is_not_found() {
        let (aggregator, _db) = aggregator_with(vec![]).await;
        let err = aggregator.compare(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PipelineError::RfpNotFound(_)));
    }

    #[tokio::test]
    async fn compare_returns_backend_ranking_with_context() {
        let rfp = sample_rfp();
        let vendor = Vendor::new("Acme", "sales@acme.com");
        let raw = format!(
            r#"{{
                "recommended_vendor_id": "{id}",
                "comparison_summary": "only one offer",
                "ranking": [
                    {{"vendor_id": "{id}", "vendor_name": "Acme", "rank": 1, "score": 85, "reason": "sole bidder"}}
                ],
                "key_insights": ["single proposal"],
                "recommendation_rationale": "no competition"
            }}"#,
            id = vendor.id,
        );
        let (aggregator, db) = aggregator_with(vec![Ok(raw)]).await;
        db.insert_rfp(&rfp).await.unwrap();
        db.insert_vendor(&vendor).await.unwrap();
        db.insert_proposal(&Proposal::new(
            rfp.id,
            vendor.id,
            "Re: RFP",
            "offer",
            ParsedProposal::default(),
            &ProposalAnalysis {
                score: 85.0,
                analysis: "solid".into(),
                ..Default::default()
            },
        ))
        .await
        .unwrap();

        let report = aggregator.compare(rfp.id).await.unwrap();
        assert_eq!(report.rfp.id, rfp.id);
        assert_eq!(report.proposals.len(), 1);
        assert_eq!(report.comparison.recommended_vendor_id, vendor.id);
        assert_eq!(report.comparison.ranking[0].rank, 1);
    }
}
