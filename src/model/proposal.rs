//! Proposal types — a vendor's structured, scored response to an RFP.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One line item of a vendor's offer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposalItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub total_price: Option<Decimal>,
    #[serde(default)]
    pub specifications: Option<String>,
}

/// Structured commercial terms extracted from a vendor reply.
///
/// All fields are defaulted: a vendor who omits warranty terms still
/// yields a usable payload, reflected in the completeness score rather
/// than a parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedProposal {
    #[serde(default)]
    pub items: Vec<ProposalItem>,
    #[serde(default)]
    pub total_price: Option<Decimal>,
    #[serde(default)]
    pub delivery_time: Option<String>,
    #[serde(default)]
    pub warranty: Option<String>,
    #[serde(default)]
    pub payment_terms: Option<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,
    /// 0–100: how completely the reply addressed the requirements.
    #[serde(default)]
    pub completeness_score: f32,
}

/// Evaluation of one proposal against the RFP requirements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposalAnalysis {
    /// 0–100.
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub recommendation: String,
}

/// Status of a stored proposal. The pipeline only ever writes `Received`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    #[default]
    Received,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
        }
    }

    pub fn parse(_s: &str) -> Self {
        Self::Received
    }
}

/// A persisted proposal. Created once, never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: Uuid,
    pub rfp_id: Uuid,
    pub vendor_id: Uuid,
    pub email_subject: String,
    pub email_body: String,
    pub parsed: ParsedProposal,
    /// 0–100, from the scoring extraction.
    pub score: f32,
    pub analysis: String,
    pub status: ProposalStatus,
    pub received_at: DateTime<Utc>,
}

impl Proposal {
    /// Assemble a proposal from its extraction artifacts.
    pub fn new(
        rfp_id: Uuid,
        vendor_id: Uuid,
        email_subject: impl Into<String>,
        email_body: impl Into<String>,
        parsed: ParsedProposal,
        analysis: &ProposalAnalysis,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            rfp_id,
            vendor_id,
            email_subject: email_subject.into(),
            email_body: email_body.into(),
            parsed,
            score: clamp_score(analysis.score),
            analysis: analysis.analysis.clone(),
            status: ProposalStatus::Received,
            received_at: Utc::now(),
        }
    }
}

/// Clamp a model-produced score into the 0–100 range.
pub fn clamp_score(score: f32) -> f32 {
    score.clamp(0.0, 100.0)
}
