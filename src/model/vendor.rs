//! Vendor types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered vendor.
///
/// The email is the matching key for inbound replies and is compared
/// case-insensitively everywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Vendor {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            contact_person: None,
            phone: None,
            address: None,
            created_at: Utc::now(),
        }
    }

    /// Whether `address` is this vendor's registered email (case-insensitive).
    pub fn matches_email(&self, address: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(address.trim())
    }
}

/// The record that an RFP was sent to a vendor. At most one per
/// (rfp, vendor) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub rfp_id: Uuid,
    pub vendor_id: Uuid,
    pub sent_at: DateTime<Utc>,
}
