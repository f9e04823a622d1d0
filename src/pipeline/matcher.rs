//! Reply matching and deduplication.
//!
//! A reply matches a vendor iff the sender address equals the vendor's
//! registered email under case-insensitive comparison — no fuzzy or
//! display-name matching. Vendors that already responded are routed to
//! the skipped set, which is what makes a repeated check cycle produce
//! zero new proposals.

use std::collections::HashSet;

use tracing::debug;
use uuid::Uuid;

use crate::mailbox::VendorReply;
use crate::model::Vendor;

/// A reply paired with the vendor it came from.
#[derive(Debug, Clone)]
pub struct MatchedReply {
    pub reply: VendorReply,
    pub vendor: Vendor,
}

/// Partition of one fetch cycle's replies.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    /// Replies to run through scoring, in mailbox order.
    pub matched: Vec<MatchedReply>,
    /// Names of vendors whose replies were skipped (already responded).
    pub skipped: Vec<String>,
    /// Replies from senders that match no invited vendor.
    pub unmatched: usize,
}

/// Partition replies into {to score, skipped vendor names, unmatched}.
///
/// `responded` is the set of vendors that already have a stored proposal
/// for this RFP. Within one batch, only a vendor's first reply proceeds;
/// later ones are skipped so the sequential scorer sees at most one
/// message per vendor.
pub fn match_replies(
    replies: Vec<VendorReply>,
    invited: &[Vendor],
    responded: &HashSet<Uuid>,
) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();
    let mut claimed: HashSet<Uuid> = HashSet::new();

    for reply in replies {
        let Some(vendor) = invited.iter().find(|v| v.matches_email(&reply.from)) else {
            debug!(from = %reply.from, "Reply matches no invited vendor, dropping");
            outcome.unmatched += 1;
            continue;
        };

        if responded.contains(&vendor.id) || !claimed.insert(vendor.id) {
            debug!(vendor = %vendor.name, "Vendor already has a proposal, skipping");
            if !outcome.skipped.contains(&vendor.name) {
                outcome.skipped.push(vendor.name.clone());
            }
            continue;
        }

        outcome.matched.push(MatchedReply {
            reply,
            vendor: vendor.clone(),
        });
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reply_from(from: &str) -> VendorReply {
        VendorReply {
            from: from.to_lowercase(),
            from_name: from.to_string(),
            subject: "Re: RFP".into(),
            body: "our offer".into(),
            date: Utc::now(),
            message_id: format!("<{from}>"),
        }
    }

    #[test]
    fn matches_vendor_case_insensitively() {
        let vendor = Vendor::new("Acme", "Vendor@X.com");
        let outcome = match_replies(
            vec![reply_from("vendor@x.com")],
            &[vendor],
            &HashSet::new(),
        );
        assert_eq!(outcome.matched.len(), 1);
        assert_eq!(outcome.matched[0].vendor.name, "Acme");
        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.unmatched, 0);
    }

    #[test]
    fn unregistered_sender_is_dropped() {
        let vendor = Vendor::new("Acme", "sales@acme.com");
        let outcome = match_replies(
            vec![reply_from("stranger@elsewhere.com")],
            &[vendor],
            &HashSet::new(),
        );
        assert!(outcome.matched.is_empty());
        assert_eq!(outcome.unmatched, 1);
    }

    #[test]
    fn responded_vendor_is_skipped_by_name() {
        let vendor = Vendor::new("Acme", "sales@acme.com");
        let responded: HashSet<Uuid> = [vendor.id].into();
        let outcome = match_replies(vec![reply_from("sales@acme.com")], &[vendor], &responded);
        assert!(outcome.matched.is_empty());
        assert_eq!(outcome.skipped, vec!["Acme".to_string()]);
    }

    #[test]
    fn second_reply_from_same_vendor_in_batch_is_skipped() {
        let vendor = Vendor::new("Acme", "sales@acme.com");
        let outcome = match_replies(
            vec![reply_from("sales@acme.com"), reply_from("sales@acme.com")],
            &[vendor],
            &HashSet::new(),
        );
        assert_eq!(outcome.matched.len(), 1);
        assert_eq!(outcome.skipped, vec!["Acme".to_string()]);
    }

    #[test]
    fn skipped_names_are_deduplicated() {
        let vendor = Vendor::new("Acme", "sales@acme.com");
        let responded: HashSet<Uuid> = [vendor.id].into();
        let outcome = match_replies(
            vec![reply_from("sales@acme.com"), reply_from("sales@acme.com")],
            &[vendor],
            &responded,
        );
        assert_eq!(outcome.skipped, vec!["Acme".to_string()]);
    }

    #[test]
    fn mixed_batch_partitions_correctly() {
        let fresh = Vendor::new("Fresh", "fresh@x.com");
        let done = Vendor::new("Done", "done@x.com");
        let responded: HashSet<Uuid> = [done.id].into();
        let outcome = match_replies(
            vec![
                reply_from("fresh@x.com"),
                reply_from("done@x.com"),
                reply_from("nobody@x.com"),
            ],
            &[fresh, done],
            &responded,
        );
        assert_eq!(outcome.matched.len(), 1);
        assert_eq!(outcome.matched[0].vendor.name, "Fresh");
        assert_eq!(outcome.skipped, vec!["Done".to_string()]);
        assert_eq!(outcome.unmatched, 1);
    }
}
