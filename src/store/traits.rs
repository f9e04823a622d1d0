//! Unified `Database` trait — single async interface for all persistence.
//!
//! The ingestion pipeline only depends on this narrow contract; it never
//! issues storage queries of its own.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{Proposal, Rfp, Vendor};

/// Backend-agnostic database trait covering RFPs, vendors, invitations,
/// and proposals.
#[async_trait]
pub trait Database: Send + Sync {
    // ── RFPs ────────────────────────────────────────────────────────

    /// Insert a new RFP.
    async fn insert_rfp(&self, rfp: &Rfp) -> Result<(), DatabaseError>;

    /// Get an RFP by ID.
    async fn get_rfp(&self, id: Uuid) -> Result<Option<Rfp>, DatabaseError>;

    /// List all RFPs, newest first.
    async fn list_rfps(&self) -> Result<Vec<Rfp>, DatabaseError>;

    /// Mark an RFP as sent. The first call fixes `sent_at`; repeat calls
    /// keep the original timestamp and never revert the status.
    async fn mark_rfp_sent(&self, id: Uuid) -> Result<(), DatabaseError>;

    // ── Vendors ─────────────────────────────────────────────────────

    /// Insert a new vendor. A duplicate email yields
    /// `DatabaseError::Constraint`.
    async fn insert_vendor(&self, vendor: &Vendor) -> Result<(), DatabaseError>;

    /// Get a vendor by ID.
    async fn get_vendor(&self, id: Uuid) -> Result<Option<Vendor>, DatabaseError>;

    /// List all vendors, by name.
    async fn list_vendors(&self) -> Result<Vec<Vendor>, DatabaseError>;

    /// Replace a vendor's stored fields.
    async fn update_vendor(&self, vendor: &Vendor) -> Result<(), DatabaseError>;

    /// Delete a vendor. Returns whether a row was removed.
    async fn delete_vendor(&self, id: Uuid) -> Result<bool, DatabaseError>;

    // ── Invitations ─────────────────────────────────────────────────

    /// Record that an RFP was sent to a vendor. Idempotent — at most one
    /// invitation per (rfp, vendor) pair.
    async fn record_invitation(&self, rfp_id: Uuid, vendor_id: Uuid)
    -> Result<(), DatabaseError>;

    /// Vendors invited to a given RFP.
    async fn list_invited_vendors(&self, rfp_id: Uuid) -> Result<Vec<Vendor>, DatabaseError>;

    // ── Proposals ───────────────────────────────────────────────────

    /// Insert a new proposal. A second proposal for the same
    /// (rfp, vendor) pair yields `DatabaseError::Constraint`.
    async fn insert_proposal(&self, proposal: &Proposal) -> Result<(), DatabaseError>;

    /// Look up the proposal for a (rfp, vendor) pair, if any.
    async fn find_proposal(
        &self,
        rfp_id: Uuid,
        vendor_id: Uuid,
    ) -> Result<Option<Proposal>, DatabaseError>;

    /// Get a proposal by ID, joined with its vendor.
    async fn get_proposal(&self, id: Uuid)
    -> Result<Option<(Proposal, Vendor)>, DatabaseError>;

    /// All proposals for an RFP joined with their vendors, highest score
    /// first.
    async fn list_proposals(&self, rfp_id: Uuid)
    -> Result<Vec<(Proposal, Vendor)>, DatabaseError>;
}
