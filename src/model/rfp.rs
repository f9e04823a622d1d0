//! RFP types — the structured procurement ask sent to vendors.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an RFP.
///
/// Transitions Draft → Sent exactly once; re-sending never reverts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RfpStatus {
    Draft,
    Sent,
}

impl RfpStatus {
    /// DB string for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
        }
    }

    /// Parse a DB status string. Unknown values fall back to Draft.
    pub fn parse(s: &str) -> Self {
        match s {
            "sent" => Self::Sent,
            _ => Self::Draft,
        }
    }
}

/// One line item the RFP asks for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequirementItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default)]
    pub specifications: String,
}

/// The requirements structure of an RFP: ordered line items plus
/// free-text additional requirements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub items: Vec<RequirementItem>,
    #[serde(default)]
    pub additional_requirements: Vec<String>,
}

/// A persisted RFP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rfp {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub requirements: Requirements,
    pub budget: Option<Decimal>,
    pub delivery_deadline: Option<NaiveDate>,
    pub payment_terms: Option<String>,
    pub warranty_terms: Option<String>,
    pub status: RfpStatus,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Rfp {
    /// Build a new draft RFP from extraction output.
    pub fn from_parsed(parsed: ParsedRfp) -> Self {
        let delivery_deadline = parsed
            .delivery_deadline
            .as_deref()
            .and_then(parse_deadline);
        Self {
            id: Uuid::new_v4(),
            title: parsed.title,
            description: parsed.description,
            requirements: parsed.requirements,
            budget: parsed.budget,
            delivery_deadline,
            payment_terms: parsed.payment_terms,
            warranty_terms: parsed.warranty_terms,
            status: RfpStatus::Draft,
            created_at: Utc::now(),
            sent_at: None,
        }
    }
}

/// Extraction output for a free-text procurement description.
///
/// Every field is defaulted so partial extraction output still parses;
/// the deadline stays a raw string here because model output is not
/// guaranteed to be a well-formed date.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedRfp {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: Requirements,
    #[serde(default)]
    pub budget: Option<Decimal>,
    #[serde(default)]
    pub delivery_deadline: Option<String>,
    #[serde(default)]
    pub payment_terms: Option<String>,
    #[serde(default)]
    pub warranty_terms: Option<String>,
}

/// Parse a `YYYY-MM-DD` deadline string, tolerating junk as `None`.
pub fn parse_deadline(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_round_trips_through_db_strings() {
        assert_eq!(RfpStatus::parse(RfpStatus::Draft.as_str()), RfpStatus::Draft);
        assert_eq!(RfpStatus::parse(RfpStatus::Sent.as_str()), RfpStatus::Sent);
    }

    #[test]
    fn unknown_status_falls_back_to_draft() {
        assert_eq!(RfpStatus::parse("archived"), RfpStatus::Draft);
    }

    #[test]
    fn parse_deadline_accepts_iso_date() {
        assert_eq!(
            parse_deadline("2026-09-15"),
            NaiveDate::from_ymd_opt(2026, 9, 15)
        );
        assert_eq!(
            parse_deadline("  2026-09-15  "),
            NaiveDate::from_ymd_opt(2026, 9, 15)
        );
    }

    #[test]
    fn parse_deadline_rejects_junk() {
        assert_eq!(parse_deadline("next quarter"), None);
        assert_eq!(parse_deadline(""), None);
    }

    #[test]
    fn parsed_rfp_tolerates_missing_fields() {
        let parsed: ParsedRfp =
            serde_json::from_str(r#"{"title": "Office laptops"}"#).unwrap();
        assert_eq!(parsed.title, "Office laptops");
        assert!(parsed.requirements.items.is_empty());
        assert!(parsed.budget.is_none());
    }

    #[test]
    fn parsed_rfp_reads_bare_number_budget() {
        let parsed: ParsedRfp =
            serde_json::from_str(r#"{"title": "x", "budget": 50000}"#).unwrap();
        assert_eq!(parsed.budget, Some(dec!(50000)));
    }

    #[test]
    fn from_parsed_starts_as_draft_with_parsed_deadline() {
        let parsed = ParsedRfp {
            title: "Office laptops".into(),
            description: "20 laptops for the new office".into(),
            delivery_deadline: Some("2026-10-01".into()),
            ..Default::default()
        };
        let rfp = Rfp::from_parsed(parsed);
        assert_eq!(rfp.status, RfpStatus::Draft);
        assert!(rfp.sent_at.is_none());
        assert_eq!(rfp.delivery_deadline, NaiveDate::from_ymd_opt(2026, 10, 1));
    }
}
