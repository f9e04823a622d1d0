//! Extraction — turns free text into typed payloads via a language-model
//! backend.
//!
//! Four stateless operations share one backend and one retry policy:
//! 1. parse an RFP out of a free-text procurement description
//! 2. parse structured commercial terms out of a vendor reply
//! 3. score a parsed proposal against the RFP requirements
//! 4. compare all proposals for an RFP into a ranking
//!
//! Malformed model output fails fast with `ExtractError::InvalidResponse`;
//! only the backend's rate-limit signal is retried.

pub mod backend;
pub mod retry;

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

pub use backend::{ExtractRequest, ExtractionBackend, ExtractorConfig, HttpBackend};
pub use retry::RetryPolicy;

use crate::error::ExtractError;
use crate::model::{
    ComparisonResult, ParsedProposal, ParsedRfp, Proposal, ProposalAnalysis, Requirements, Rfp,
    Vendor,
};

/// Temperature for RFP parsing.
const PARSE_RFP_TEMPERATURE: f32 = 0.3;

/// Temperature for reply parsing (tightest — pricing must not drift).
const PARSE_REPLY_TEMPERATURE: f32 = 0.2;

/// Temperature for scoring and comparison.
const EVALUATE_TEMPERATURE: f32 = 0.3;

/// Stateless extraction service over a completion backend.
pub struct ExtractionService {
    backend: Arc<dyn ExtractionBackend>,
    retry: RetryPolicy,
}

impl ExtractionService {
    pub fn new(backend: Arc<dyn ExtractionBackend>) -> Self {
        Self {
            backend,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Parse a free-text procurement description into RFP fields.
    pub async fn parse_rfp(&self, input: &str) -> Result<ParsedRfp, ExtractError> {
        let request = ExtractRequest::new(rfp_system_prompt(), build_rfp_user_prompt(input))
            .with_temperature(PARSE_RFP_TEMPERATURE);
        let raw = self.complete_with_retry(request).await?;
        parse_payload(&raw)
    }

    /// Parse a vendor reply into structured commercial terms.
    pub async fn parse_vendor_reply(
        &self,
        body: &str,
        subject: &str,
        rfp: &Rfp,
    ) -> Result<ParsedProposal, ExtractError> {
        let request = ExtractRequest::new(
            reply_system_prompt(),
            build_reply_user_prompt(body, subject, rfp),
        )
        .with_temperature(PARSE_REPLY_TEMPERATURE);
        let raw = self.complete_with_retry(request).await?;
        parse_payload(&raw)
    }

    /// Score a parsed proposal against the RFP requirements.
    pub async fn score_proposal(
        &self,
        parsed: &ParsedProposal,
        requirements: &Requirements,
    ) -> Result<ProposalAnalysis, ExtractError> {
        let request = ExtractRequest::new(
            score_system_prompt(),
            build_score_user_prompt(parsed, requirements)?,
        )
        .with_temperature(EVALUATE_TEMPERATURE);
        let raw = self.complete_with_retry(request).await?;
        parse_payload(&raw)
    }

    /// Rank all proposals for an RFP and pick a recommended vendor.
    ///
    /// The ranking comes back exactly as the backend ordered it.
    pub async fn compare_proposals(
        &self,
        proposals: &[(Proposal, Vendor)],
        rfp: &Rfp,
    ) -> Result<ComparisonResult, ExtractError> {
        let request = ExtractRequest::new(
            compare_system_prompt(),
            build_compare_user_prompt(proposals, rfp)?,
        )
        .with_temperature(EVALUATE_TEMPERATURE);
        let raw = self.complete_with_retry(request).await?;
        parse_payload(&raw)
    }

    async fn complete_with_retry(&self, request: ExtractRequest) -> Result<String, ExtractError> {
        debug!(model = self.backend.model_name(), "Extraction call");
        self.retry
            .run(|| self.backend.complete(request.clone()))
            .await
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn rfp_system_prompt() -> String {
    "You are a procurement expert that converts natural language into structured \
     RFP data. Always respond with valid JSON only."
        .to_string()
}

fn build_rfp_user_prompt(input: &str) -> String {
    format!(
        "Parse the following natural language description into a structured RFP.\n\n\
         User input: \"{input}\"\n\n\
         Return a JSON object with this structure:\n\
         {{\n\
           \"title\": \"brief title for the RFP\",\n\
           \"description\": \"detailed description of what needs to be procured\",\n\
           \"requirements\": {{\n\
             \"items\": [{{\"name\": \"item name\", \"quantity\": number, \"specifications\": \"detailed specs\"}}],\n\
             \"additional_requirements\": [\"list\", \"of\", \"requirements\"]\n\
           }},\n\
           \"budget\": number (only the number, no currency symbols),\n\
           \"delivery_deadline\": \"YYYY-MM-DD if mentioned, else estimate from context\",\n\
           \"payment_terms\": \"payment terms if mentioned\",\n\
           \"warranty_terms\": \"warranty requirements if mentioned\"\n\
         }}\n\n\
         Extract all numerical values, dates, and requirements mentioned. If something \
         isn't mentioned, use reasonable defaults for procurement."
    )
}

fn reply_system_prompt() -> String {
    "You are an expert at extracting structured procurement data from vendor emails. \
     Always respond with valid JSON only."
        .to_string()
}

fn build_reply_user_prompt(body: &str, subject: &str, rfp: &Rfp) -> String {
    let requirements =
        serde_json::to_string(&rfp.requirements).unwrap_or_else(|_| "{}".to_string());
    format!(
        "You are analyzing a vendor's response to an RFP. Extract structured data \
         from their email.\n\n\
         RFP title: {title}\n\
         RFP requirements: {requirements}\n\n\
         Vendor email:\n\
         Subject: {subject}\n\
         Body: {body}\n\n\
         Return a JSON object:\n\
         {{\n\
           \"items\": [{{\"name\": \"item name\", \"quantity\": number, \"unit_price\": number, \
         \"total_price\": number, \"specifications\": \"what they're offering\"}}],\n\
           \"total_price\": number,\n\
           \"delivery_time\": \"delivery timeline\",\n\
           \"warranty\": \"warranty terms\",\n\
           \"payment_terms\": \"payment terms\",\n\
           \"additional_notes\": \"any other important information\",\n\
           \"completeness_score\": number (0-100, how well they addressed all requirements)\n\
         }}\n\n\
         Extract all pricing, timeline, and term information. Be thorough.",
        title = rfp.title,
    )
}

fn score_system_prompt() -> String {
    "You are a procurement expert evaluating vendor proposals. Provide objective, \
     data-driven analysis. Always respond with valid JSON only."
        .to_string()
}

fn build_score_user_prompt(
    parsed: &ParsedProposal,
    requirements: &Requirements,
) -> Result<String, ExtractError> {
    let requirements = serde_json::to_string_pretty(requirements)?;
    let proposal = serde_json::to_string_pretty(parsed)?;
    Ok(format!(
        "Analyze this vendor proposal against the RFP requirements and provide a \
         detailed evaluation.\n\n\
         RFP requirements:\n{requirements}\n\n\
         Vendor proposal:\n{proposal}\n\n\
         Return a JSON object:\n\
         {{\n\
           \"score\": number (0-100),\n\
           \"analysis\": \"detailed analysis covering price competitiveness, requirement \
         coverage, delivery timeline, warranty terms, and overall value\",\n\
           \"strengths\": [\"list\", \"of\", \"strengths\"],\n\
           \"weaknesses\": [\"list\", \"of\", \"weaknesses\"],\n\
           \"recommendation\": \"brief recommendation\"\n\
         }}"
    ))
}

fn compare_system_prompt() -> String {
    "You are a senior procurement advisor. Compare proposals objectively considering \
     price, quality, delivery, and risk. Always respond with valid JSON only."
        .to_string()
}

/// Digest of one proposal for the comparison prompt — just the fields
/// the ranking should weigh.
#[derive(Serialize)]
struct ProposalDigest<'a> {
    vendor_id: String,
    vendor_name: &'a str,
    score: f32,
    total_price: Option<Decimal>,
    delivery_time: Option<&'a str>,
    warranty: Option<&'a str>,
    payment_terms: Option<&'a str>,
    completeness_score: f32,
    analysis: &'a str,
}

fn build_compare_user_prompt(
    proposals: &[(Proposal, Vendor)],
    rfp: &Rfp,
) -> Result<String, ExtractError> {
    let digests: Vec<ProposalDigest<'_>> = proposals
        .iter()
        .map(|(p, v)| ProposalDigest {
            vendor_id: v.id.to_string(),
            vendor_name: &v.name,
            score: p.score,
            total_price: p.parsed.total_price,
            delivery_time: p.parsed.delivery_time.as_deref(),
            warranty: p.parsed.warranty.as_deref(),
            payment_terms: p.parsed.payment_terms.as_deref(),
            completeness_score: p.parsed.completeness_score,
            analysis: &p.analysis,
        })
        .collect();

    let requirements = serde_json::to_string(&rfp.requirements)?;
    let proposals_json = serde_json::to_string_pretty(&digests)?;
    let budget = rfp
        .budget
        .map(|b| b.to_string())
        .unwrap_or_else(|| "not specified".to_string());

    Ok(format!(
        "Compare these vendor proposals for an RFP and recommend the best option.\n\n\
         RFP: {title}\n\
         Budget: {budget}\n\
         Requirements: {requirements}\n\n\
         Proposals:\n{proposals_json}\n\n\
         Return a JSON object:\n\
         {{\n\
           \"recommended_vendor_id\": \"vendor_id of the best option, exactly as given above\",\n\
           \"comparison_summary\": \"overall comparison of all proposals\",\n\
           \"ranking\": [{{\"vendor_id\": \"exactly as given\", \"vendor_name\": \"name\", \
         \"rank\": number (1 = best), \"score\": number, \"reason\": \"why this ranking\"}}],\n\
           \"key_insights\": [\"important\", \"insights\"],\n\
           \"recommendation_rationale\": \"detailed explanation of why the recommended \
         vendor is the best choice\"\n\
         }}",
        title = rfp.title,
    ))
}

// ── Response parsing ────────────────────────────────────────────────

/// Deserialize a model response, failing fast on schema mismatch.
fn parse_payload<T: DeserializeOwned>(raw: &str) -> Result<T, ExtractError> {
    let json = extract_json_object(raw);
    serde_json::from_str(&json).map_err(|e| ExtractError::InvalidResponse {
        reason: format!("schema mismatch: {e}"),
    })
}

/// Extract a JSON object from model output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    // Already a JSON object
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    // Wrapped in a markdown code block
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    // Try to find object bounds
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

/// Test support — a scriptable backend shared by extraction and
/// pipeline tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::{ExtractRequest, ExtractionBackend};
    use crate::error::ExtractError;

    /// Mock backend that pops queued responses.
    pub(crate) struct MockBackend {
        responses: Mutex<VecDeque<Result<String, ExtractError>>>,
        pub calls: AtomicU32,
    }

    impl MockBackend {
        pub fn new(responses: Vec<Result<String, ExtractError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ExtractionBackend for MockBackend {
        fn model_name(&self) -> &str {
            "mock"
        }

        async fn complete(&self, _request: ExtractRequest) -> Result<String, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(ExtractError::RequestFailed {
                        reason: "mock exhausted".into(),
                    })
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockBackend;
    use super::*;
    use std::sync::atomic::Ordering;

    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::model::{ProposalStatus, RfpStatus};

    fn sample_rfp() -> Rfp {
        Rfp {
            id: Uuid::new_v4(),
            title: "Office laptops".into(),
            description: "20 laptops".into(),
            requirements: Requirements::default(),
            budget: Some(dec!(30000)),
            delivery_deadline: None,
            payment_terms: None,
            warranty_terms: None,
            status: RfpStatus::Sent,
            created_at: Utc::now(),
            sent_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn parse_rfp_reads_backend_json() {
        let backend = Arc::new(MockBackend::new(vec![Ok(r#"{
            "title": "Office laptops",
            "description": "20 laptops",
            "requirements": {"items": [{"name": "Laptop", "quantity": 20, "specifications": "16GB"}]},
            "budget": 30000
        }"#
        .to_string())]));
        let service = ExtractionService::new(backend);

        let parsed = service.parse_rfp("we need 20 laptops").await.unwrap();
        assert_eq!(parsed.title, "Office laptops");
        assert_eq!(parsed.requirements.items[0].quantity, 20);
        assert_eq!(parsed.budget, Some(dec!(30000)));
    }

    #[tokio::test]
    async fn markdown_wrapped_output_still_parses() {
        let backend = Arc::new(MockBackend::new(vec![Ok(
            "Here you go:\n```json\n{\"title\": \"Cables\"}\n```".to_string(),
        )]));
        let service = ExtractionService::new(backend);

        let parsed = service.parse_rfp("cables").await.unwrap();
        assert_eq!(parsed.title, "Cables");
    }

    #[tokio::test]
    async fn malformed_output_fails_fast_without_retry() {
        let backend = Arc::new(MockBackend::new(vec![Ok(
            "sorry, I can't help with that".to_string(),
        )]));
        let service = ExtractionService::new(Arc::clone(&backend) as Arc<dyn ExtractionBackend>);

        let err = service.parse_rfp("anything").await.unwrap_err();
        assert!(matches!(err, ExtractError::InvalidResponse { .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_are_retried_until_success() {
        let backend = Arc::new(MockBackend::new(vec![
            Err(ExtractError::RateLimited { retry_after: None }),
            Err(ExtractError::RateLimited { retry_after: None }),
            Ok(r#"{"title": "Cables"}"#.to_string()),
        ]));
        let service = ExtractionService::new(Arc::clone(&backend) as Arc<dyn ExtractionBackend>);

        let parsed = service.parse_rfp("cables").await.unwrap();
        assert_eq!(parsed.title, "Cables");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_exhaustion_propagates() {
        let backend = Arc::new(MockBackend::new(vec![
            Err(ExtractError::RateLimited { retry_after: None }),
            Err(ExtractError::RateLimited { retry_after: None }),
            Err(ExtractError::RateLimited { retry_after: None }),
        ]));
        let service = ExtractionService::new(Arc::clone(&backend) as Arc<dyn ExtractionBackend>);

        let err = service.parse_rfp("cables").await.unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn score_proposal_parses_analysis() {
        let backend = Arc::new(MockBackend::new(vec![Ok(r#"{
            "score": 87,
            "analysis": "competitive pricing, tight timeline",
            "strengths": ["price"],
            "weaknesses": ["timeline"],
            "recommendation": "shortlist"
        }"#
        .to_string())]));
        let service = ExtractionService::new(backend);

        let analysis = service
            .score_proposal(&ParsedProposal::default(), &Requirements::default())
            .await
            .unwrap();
        assert_eq!(analysis.score, 87.0);
        assert_eq!(analysis.strengths, vec!["price".to_string()]);
    }

    #[tokio::test]
    async fn compare_keeps_backend_ranking_order() {
        let vendor_a = Vendor::new("Acme", "a@x.com");
        let vendor_b = Vendor::new("Bolt", "b@x.com");
        // Backend returns Bolt first even though Acme has rank 1 — the
        // service must not re-sort.
        let raw = format!(
            r#"{{
                "recommended_vendor_id": "{a}",
                "comparison_summary": "close race",
                "ranking": [
                    {{"vendor_id": "{b}", "vendor_name": "Bolt", "rank": 2, "score": 70, "reason": "slower"}},
                    {{"vendor_id": "{a}", "vendor_name": "Acme", "rank": 1, "score": 90, "reason": "best value"}}
                ],
                "key_insights": [],
                "recommendation_rationale": "Acme wins on price"
            }}"#,
            a = vendor_a.id,
            b = vendor_b.id,
        );
        let backend = Arc::new(MockBackend::new(vec![Ok(raw)]));
        let service = ExtractionService::new(backend);

        let rfp = sample_rfp();
        let proposals = vec![
            (
                Proposal {
                    id: Uuid::new_v4(),
                    rfp_id: rfp.id,
                    vendor_id: vendor_a.id,
                    email_subject: "Re: RFP".into(),
                    email_body: "offer".into(),
                    parsed: ParsedProposal::default(),
                    score: 90.0,
                    analysis: String::new(),
                    status: ProposalStatus::Received,
                    received_at: Utc::now(),
                },
                vendor_a.clone(),
            ),
            (
                Proposal {
                    id: Uuid::new_v4(),
                    rfp_id: rfp.id,
                    vendor_id: vendor_b.id,
                    email_subject: "Re: RFP".into(),
                    email_body: "offer".into(),
                    parsed: ParsedProposal::default(),
                    score: 70.0,
                    analysis: String::new(),
                    status: ProposalStatus::Received,
                    received_at: Utc::now(),
                },
                vendor_b,
            ),
        ];

        let result = service.compare_proposals(&proposals, &rfp).await.unwrap();
        assert_eq!(result.recommended_vendor_id, vendor_a.id);
        // Order exactly as the backend returned it
        assert_eq!(result.ranking[0].vendor_name, "Bolt");
        assert_eq!(result.ranking[1].vendor_name, "Acme");
        assert_eq!(result.ranking[1].rank, 1);
    }

    // ── JSON extraction ─────────────────────────────────────────────

    #[test]
    fn extract_json_direct_object() {
        let input = r#"{"title": "x"}"#;
        assert_eq!(extract_json_object(input), input);
    }

    #[test]
    fn extract_json_from_markdown_block() {
        let input = "```json\n{\"title\": \"x\"}\n```";
        let result = extract_json_object(input);
        assert!(result.starts_with('{'));
        assert!(result.contains("title"));
    }

    #[test]
    fn extract_json_embedded_in_text() {
        let input = "My analysis: {\"title\": \"x\"} done.";
        let result = extract_json_object(input);
        assert!(result.starts_with('{'));
        assert!(result.ends_with('}'));
    }

    #[test]
    fn prompts_carry_rfp_context() {
        let rfp = sample_rfp();
        let prompt = build_reply_user_prompt("our offer", "Re: RFP", &rfp);
        assert!(prompt.contains("Office laptops"));
        assert!(prompt.contains("our offer"));
        assert!(prompt.contains("Re: RFP"));
        assert!(prompt.contains("completeness_score"));
    }

    #[test]
    fn compare_prompt_lists_vendor_ids_verbatim() {
        let rfp = sample_rfp();
        let vendor = Vendor::new("Acme", "a@x.com");
        let proposals = vec![(
            Proposal {
                id: Uuid::new_v4(),
                rfp_id: rfp.id,
                vendor_id: vendor.id,
                email_subject: "s".into(),
                email_body: "b".into(),
                parsed: ParsedProposal {
                    total_price: Some(dec!(24000)),
                    ..Default::default()
                },
                score: 80.0,
                analysis: "solid".into(),
                status: ProposalStatus::Received,
                received_at: Utc::now(),
            },
            vendor.clone(),
        )];
        let prompt = build_compare_user_prompt(&proposals, &rfp).unwrap();
        assert!(prompt.contains(&vendor.id.to_string()));
        assert!(prompt.contains("Acme"));
        assert!(prompt.contains("30000"));
    }
}
