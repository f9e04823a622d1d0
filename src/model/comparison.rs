//! Comparison types — the on-demand ranking of all proposals for one RFP.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::proposal::Proposal;
use super::rfp::Rfp;
use super::vendor::Vendor;

/// One entry of the comparison ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedProposal {
    pub vendor_id: Uuid,
    #[serde(default)]
    pub vendor_name: String,
    #[serde(default)]
    pub rank: u32,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub reason: String,
}

/// Comparison of all proposals for an RFP, as produced by the extraction
/// backend. The ranking order is reported exactly as returned — never
/// re-sorted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub recommended_vendor_id: Uuid,
    #[serde(default)]
    pub comparison_summary: String,
    #[serde(default)]
    pub ranking: Vec<RankedProposal>,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub recommendation_rationale: String,
}

/// What the aggregator hands back: the RFP, its proposals (with the
/// vendors that made them), and the freshly computed comparison.
/// Never persisted — recomputed on every request.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub rfp: Rfp,
    pub proposals: Vec<(Proposal, Vendor)>,
    pub comparison: ComparisonResult,
}
