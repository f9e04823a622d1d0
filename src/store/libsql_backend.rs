//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. The schema is a simple
//! `CREATE TABLE IF NOT EXISTS` bootstrap; the UNIQUE constraint on
//! `proposals(rfp_id, vendor_id)` is the storage-level backstop for the
//! pipeline's duplicate pre-check.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    ParsedProposal, Proposal, ProposalStatus, Requirements, Rfp, RfpStatus, Vendor,
};
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and bootstrap the schema.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS vendors (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    contact_person TEXT,
                    phone TEXT,
                    address TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS rfps (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL,
                    requirements TEXT NOT NULL,
                    budget TEXT,
                    delivery_deadline TEXT,
                    payment_terms TEXT,
                    warranty_terms TEXT,
                    status TEXT NOT NULL DEFAULT 'draft',
                    created_at TEXT NOT NULL,
                    sent_at TEXT
                );

                CREATE TABLE IF NOT EXISTS rfp_vendors (
                    rfp_id TEXT NOT NULL REFERENCES rfps(id) ON DELETE CASCADE,
                    vendor_id TEXT NOT NULL REFERENCES vendors(id) ON DELETE CASCADE,
                    sent_at TEXT NOT NULL,
                    PRIMARY KEY (rfp_id, vendor_id)
                );

                CREATE TABLE IF NOT EXISTS proposals (
                    id TEXT PRIMARY KEY,
                    rfp_id TEXT NOT NULL REFERENCES rfps(id) ON DELETE CASCADE,
                    vendor_id TEXT NOT NULL REFERENCES vendors(id) ON DELETE CASCADE,
                    email_subject TEXT NOT NULL,
                    email_body TEXT NOT NULL,
                    parsed TEXT NOT NULL,
                    score REAL NOT NULL,
                    analysis TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'received',
                    received_at TEXT NOT NULL,
                    UNIQUE (rfp_id, vendor_id)
                );
                CREATE INDEX IF NOT EXISTS idx_proposals_rfp ON proposals(rfp_id);
                "#,
            )
            .await
            .map(|_| ())
            .map_err(|e| DatabaseError::Query(format!("init_schema: {e}")))
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a libsql error, recognizing uniqueness violations.
fn map_write_err(op: &str, e: libsql::Error) -> DatabaseError {
    let text = e.to_string();
    if text.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{op}: {text}"))
    } else {
        DatabaseError::Query(format!("{op}: {text}"))
    }
}

const RFP_COLUMNS: &str = "id, title, description, requirements, budget, delivery_deadline, \
                           payment_terms, warranty_terms, status, created_at, sent_at";

fn row_to_rfp(row: &libsql::Row) -> Result<Rfp, libsql::Error> {
    let id_str: String = row.get(0)?;
    let requirements_str: String = row.get(3)?;
    let budget_str: Option<String> = row.get(4).ok();
    let deadline_str: Option<String> = row.get(5).ok();
    let status_str: String = row.get(8)?;
    let created_str: String = row.get(9)?;
    let sent_str: Option<String> = row.get(10).ok();

    let requirements: Requirements =
        serde_json::from_str(&requirements_str).unwrap_or_default();

    Ok(Rfp {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        title: row.get(1)?,
        description: row.get(2)?,
        requirements,
        budget: budget_str.as_deref().and_then(|s| s.parse::<Decimal>().ok()),
        delivery_deadline: deadline_str
            .as_deref()
            .and_then(|s| s.parse::<chrono::NaiveDate>().ok()),
        payment_terms: row.get(6).ok(),
        warranty_terms: row.get(7).ok(),
        status: RfpStatus::parse(&status_str),
        created_at: parse_datetime(&created_str),
        sent_at: sent_str.as_deref().map(parse_datetime),
    })
}

const VENDOR_COLUMNS: &str = "id, name, email, contact_person, phone, address, created_at";

fn row_to_vendor_at(row: &libsql::Row, offset: i32) -> Result<Vendor, libsql::Error> {
    let id_str: String = row.get(offset)?;
    let created_str: String = row.get(offset + 6)?;
    Ok(Vendor {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        name: row.get(offset + 1)?,
        email: row.get(offset + 2)?,
        contact_person: row.get(offset + 3).ok(),
        phone: row.get(offset + 4).ok(),
        address: row.get(offset + 5).ok(),
        created_at: parse_datetime(&created_str),
    })
}

const PROPOSAL_COLUMNS: &str = "p.id, p.rfp_id, p.vendor_id, p.email_subject, p.email_body, \
                                p.parsed, p.score, p.analysis, p.status, p.received_at";

fn row_to_proposal(row: &libsql::Row) -> Result<Proposal, libsql::Error> {
    let id_str: String = row.get(0)?;
    let rfp_str: String = row.get(1)?;
    let vendor_str: String = row.get(2)?;
    let parsed_str: String = row.get(5)?;
    let score: f64 = row.get(6)?;
    let status_str: String = row.get(8)?;
    let received_str: String = row.get(9)?;

    let parsed: ParsedProposal = serde_json::from_str(&parsed_str).unwrap_or_default();

    Ok(Proposal {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        rfp_id: Uuid::parse_str(&rfp_str).unwrap_or_else(|_| Uuid::nil()),
        vendor_id: Uuid::parse_str(&vendor_str).unwrap_or_else(|_| Uuid::nil()),
        email_subject: row.get(3)?,
        email_body: row.get(4)?,
        parsed,
        score: score as f32,
        analysis: row.get(7)?,
        status: ProposalStatus::parse(&status_str),
        received_at: parse_datetime(&received_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn insert_rfp(&self, rfp: &Rfp) -> Result<(), DatabaseError> {
        let requirements = serde_json::to_string(&rfp.requirements)
            .map_err(|e| DatabaseError::Serialization(format!("insert_rfp: {e}")))?;
        self.conn()
            .execute(
                "INSERT INTO rfps (id, title, description, requirements, budget, \
                 delivery_deadline, payment_terms, warranty_terms, status, created_at, sent_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    rfp.id.to_string(),
                    rfp.title.as_str(),
                    rfp.description.as_str(),
                    requirements,
                    opt_text(rfp.budget.map(|b| b.to_string()).as_deref()),
                    opt_text(rfp.delivery_deadline.map(|d| d.to_string()).as_deref()),
                    opt_text(rfp.payment_terms.as_deref()),
                    opt_text(rfp.warranty_terms.as_deref()),
                    rfp.status.as_str(),
                    rfp.created_at.to_rfc3339(),
                    opt_text(rfp.sent_at.map(|t| t.to_rfc3339()).as_deref()),
                ],
            )
            .await
            .map_err(|e| map_write_err("insert_rfp", e))?;
        Ok(())
    }

    async fn get_rfp(&self, id: Uuid) -> Result<Option<Rfp>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {RFP_COLUMNS} FROM rfps WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_rfp: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_rfp(&row).map_err(|e| {
                DatabaseError::Query(format!("get_rfp row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_rfp: {e}"))),
        }
    }

    async fn list_rfps(&self) -> Result<Vec<Rfp>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {RFP_COLUMNS} FROM rfps ORDER BY created_at DESC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_rfps: {e}")))?;

        let mut rfps = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            if let Ok(rfp) = row_to_rfp(&row) {
                rfps.push(rfp);
            }
        }
        Ok(rfps)
    }

    async fn mark_rfp_sent(&self, id: Uuid) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn()
            .execute(
                "UPDATE rfps SET status = 'sent', sent_at = COALESCE(sent_at, ?1) WHERE id = ?2",
                params![now, id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_rfp_sent: {e}")))?;
        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "rfp".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_vendor(&self, vendor: &Vendor) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO vendors (id, name, email, contact_person, phone, address, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    vendor.id.to_string(),
                    vendor.name.as_str(),
                    vendor.email.as_str(),
                    opt_text(vendor.contact_person.as_deref()),
                    opt_text(vendor.phone.as_deref()),
                    opt_text(vendor.address.as_deref()),
                    vendor.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_write_err("insert_vendor", e))?;
        Ok(())
    }

    async fn get_vendor(&self, id: Uuid) -> Result<Option<Vendor>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {VENDOR_COLUMNS} FROM vendors WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_vendor: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_vendor_at(&row, 0).map_err(|e| {
                DatabaseError::Query(format!("get_vendor row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_vendor: {e}"))),
        }
    }

    async fn list_vendors(&self) -> Result<Vec<Vendor>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {VENDOR_COLUMNS} FROM vendors ORDER BY name ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_vendors: {e}")))?;

        let mut vendors = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            if let Ok(vendor) = row_to_vendor_at(&row, 0) {
                vendors.push(vendor);
            }
        }
        Ok(vendors)
    }

    async fn update_vendor(&self, vendor: &Vendor) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE vendors SET name = ?1, email = ?2, contact_person = ?3, phone = ?4, \
                 address = ?5 WHERE id = ?6",
                params![
                    vendor.name.as_str(),
                    vendor.email.as_str(),
                    opt_text(vendor.contact_person.as_deref()),
                    opt_text(vendor.phone.as_deref()),
                    opt_text(vendor.address.as_deref()),
                    vendor.id.to_string(),
                ],
            )
            .await
            .map_err(|e| map_write_err("update_vendor", e))?;
        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "vendor".into(),
                id: vendor.id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_vendor(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "DELETE FROM vendors WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_vendor: {e}")))?;
        Ok(affected > 0)
    }

    async fn record_invitation(
        &self,
        rfp_id: Uuid,
        vendor_id: Uuid,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO rfp_vendors (rfp_id, vendor_id, sent_at) \
                 VALUES (?1, ?2, ?3)",
                params![
                    rfp_id.to_string(),
                    vendor_id.to_string(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_invitation: {e}")))?;
        Ok(())
    }

    async fn list_invited_vendors(&self, rfp_id: Uuid) -> Result<Vec<Vendor>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {VENDOR_COLUMNS} FROM vendors v \
                     JOIN rfp_vendors rv ON v.id = rv.vendor_id \
                     WHERE rv.rfp_id = ?1"
                ),
                params![rfp_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_invited_vendors: {e}")))?;

        let mut vendors = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            if let Ok(vendor) = row_to_vendor_at(&row, 0) {
                vendors.push(vendor);
            }
        }
        Ok(vendors)
    }

    async fn insert_proposal(&self, proposal: &Proposal) -> Result<(), DatabaseError> {
        let parsed = serde_json::to_string(&proposal.parsed)
            .map_err(|e| DatabaseError::Serialization(format!("insert_proposal: {e}")))?;
        self.conn()
            .execute(
                "INSERT INTO proposals (id, rfp_id, vendor_id, email_subject, email_body, \
                 parsed, score, analysis, status, received_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    proposal.id.to_string(),
                    proposal.rfp_id.to_string(),
                    proposal.vendor_id.to_string(),
                    proposal.email_subject.as_str(),
                    proposal.email_body.as_str(),
                    parsed,
                    proposal.score as f64,
                    proposal.analysis.as_str(),
                    proposal.status.as_str(),
                    proposal.received_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| map_write_err("insert_proposal", e))?;
        Ok(())
    }

    async fn find_proposal(
        &self,
        rfp_id: Uuid,
        vendor_id: Uuid,
    ) -> Result<Option<Proposal>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PROPOSAL_COLUMNS} FROM proposals p \
                     WHERE p.rfp_id = ?1 AND p.vendor_id = ?2"
                ),
                params![rfp_id.to_string(), vendor_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_proposal: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_proposal(&row).map_err(|e| {
                DatabaseError::Query(format!("find_proposal row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_proposal: {e}"))),
        }
    }

    async fn get_proposal(
        &self,
        id: Uuid,
    ) -> Result<Option<(Proposal, Vendor)>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PROPOSAL_COLUMNS}, {vendor_cols} FROM proposals p \
                     JOIN vendors v ON p.vendor_id = v.id \
                     WHERE p.id = ?1",
                    vendor_cols = vendor_columns_qualified(),
                ),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_proposal: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let proposal = row_to_proposal(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_proposal row parse: {e}")))?;
                let vendor = row_to_vendor_at(&row, 10)
                    .map_err(|e| DatabaseError::Query(format!("get_proposal row parse: {e}")))?;
                Ok(Some((proposal, vendor)))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_proposal: {e}"))),
        }
    }

    async fn list_proposals(
        &self,
        rfp_id: Uuid,
    ) -> Result<Vec<(Proposal, Vendor)>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PROPOSAL_COLUMNS}, {vendor_cols} FROM proposals p \
                     JOIN vendors v ON p.vendor_id = v.id \
                     WHERE p.rfp_id = ?1 \
                     ORDER BY p.score DESC",
                    vendor_cols = vendor_columns_qualified(),
                ),
                params![rfp_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_proposals: {e}")))?;

        let mut proposals = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let proposal = row_to_proposal(&row)
                .map_err(|e| DatabaseError::Query(format!("list_proposals row parse: {e}")))?;
            let vendor = row_to_vendor_at(&row, 10)
                .map_err(|e| DatabaseError::Query(format!("list_proposals row parse: {e}")))?;
            proposals.push((proposal, vendor));
        }
        Ok(proposals)
    }
}

/// Vendor columns qualified with the `v.` alias for joined selects.
fn vendor_columns_qualified() -> String {
    VENDOR_COLUMNS
        .split(", ")
        .map(|c| format!("v.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}
