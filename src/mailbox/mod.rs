//! Mailbox access — IMAP polling for inbound vendor replies, SMTP via
//! lettre for outbound solicitations.

pub mod reader;
pub mod sender;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

pub use reader::MailboxReader;
pub use sender::RfpMailer;

// ── Configuration ───────────────────────────────────────────────────

/// Mailbox configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl MailboxConfig {
    /// Build config from environment variables.
    /// Returns `None` if `MAILBOX_IMAP_HOST` is not set (mailbox disabled).
    pub fn from_env() -> Option<Self> {
        let imap_host = std::env::var("MAILBOX_IMAP_HOST").ok()?;

        let imap_port: u16 = std::env::var("MAILBOX_IMAP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(993);

        let smtp_host = std::env::var("MAILBOX_SMTP_HOST")
            .unwrap_or_else(|_| imap_host.replace("imap", "smtp"));

        let smtp_port: u16 = std::env::var("MAILBOX_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("MAILBOX_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("MAILBOX_PASSWORD").unwrap_or_default());
        let from_address =
            std::env::var("MAILBOX_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Some(Self {
            imap_host,
            imap_port,
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
        })
    }
}

// ── Inbound message ─────────────────────────────────────────────────

/// A normalized inbound reply from the mailbox.
///
/// Transient — produced for one fetch cycle, discarded after matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorReply {
    /// Sender address, lowercased and trimmed.
    pub from: String,
    /// Display name, or the address when none was given.
    pub from_name: String,
    pub subject: String,
    pub body: String,
    pub date: DateTime<Utc>,
    pub message_id: String,
}

// ── Source trait ────────────────────────────────────────────────────

/// Source of inbound vendor replies — pure I/O, no business logic.
///
/// Implementations must be advisory: any failure yields an empty list,
/// never an error, because a manual entry path always exists.
#[async_trait]
pub trait MailboxSource: Send + Sync {
    /// Fetch recent candidate replies. Returns an empty list on any
    /// mailbox failure.
    async fn fetch_recent(&self) -> Vec<VendorReply>;
}
