//! IMAP reader — time-windowed fetch of candidate vendor replies.
//!
//! One transient connection per fetch: connect, LOGIN, SELECT INBOX,
//! SEARCH SINCE the lookback window, FETCH the most recent few, parse,
//! LOGOUT. The connection is torn down exactly once whatever happens —
//! it lives in the blocking closure and drops with it.

use std::io::Write as IoWrite;
use std::net::TcpStream;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use mail_parser::MessageParser;
use secrecy::ExposeSecret;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::MailboxError;
use crate::mailbox::{MailboxConfig, MailboxSource, VendorReply};

/// IMAP-backed reply source.
pub struct MailboxReader {
    config: MailboxConfig,
    lookback_days: i64,
    max_messages: usize,
}

impl MailboxReader {
    pub fn new(config: MailboxConfig, lookback_days: i64, max_messages: usize) -> Self {
        Self {
            config,
            lookback_days,
            max_messages,
        }
    }
}

#[async_trait]
impl MailboxSource for MailboxReader {
    /// Fetch replies received within the lookback window, newest-biased
    /// (only the last `max_messages` search hits are fetched; anything
    /// older or earlier is left for manual entry).
    ///
    /// Never fails: connection or search errors log a warning and yield
    /// an empty list.
    async fn fetch_recent(&self) -> Vec<VendorReply> {
        let cfg = self.config.clone();
        let since = (Utc::now() - chrono::Duration::days(self.lookback_days)).date_naive();
        let max = self.max_messages;

        match tokio::task::spawn_blocking(move || fetch_window_imap(&cfg, since, max)).await {
            Ok(Ok(replies)) => {
                debug!(count = replies.len(), "Fetched mailbox replies");
                replies
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Mailbox fetch failed, returning no replies");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "Mailbox fetch task panicked, returning no replies");
                Vec::new()
            }
        }
    }
}

// ── Helpers (public for testing) ────────────────────────────────────

/// Format a date for an IMAP SEARCH SINCE criterion (`6-Aug-2026`).
/// Month names are always English regardless of locale.
pub fn format_since_date(date: NaiveDate) -> String {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    use chrono::Datelike;
    format!(
        "{}-{}-{}",
        date.day(),
        MONTHS[date.month0() as usize],
        date.year()
    )
}

/// Strip HTML tags from content (basic).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    // Normalize whitespace
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a parsed email into a `VendorReply`.
pub fn normalize_message(parsed: &mail_parser::Message) -> VendorReply {
    let (from, from_name) = extract_sender(parsed);

    let body = if let Some(text) = parsed.body_text(0) {
        text.to_string()
    } else if let Some(html) = parsed.body_html(0) {
        strip_html(html.as_ref())
    } else {
        String::new()
    };

    let date = parsed
        .date()
        .and_then(|d| {
            NaiveDate::from_ymd_opt(d.year as i32, u32::from(d.month), u32::from(d.day))
                .and_then(|date| {
                    date.and_hms_opt(
                        u32::from(d.hour),
                        u32::from(d.minute),
                        u32::from(d.second),
                    )
                })
                .map(|naive| naive.and_utc())
        })
        .unwrap_or_else(Utc::now);

    VendorReply {
        from,
        from_name,
        subject: parsed.subject().unwrap_or("(no subject)").to_string(),
        body,
        date,
        message_id: parsed
            .message_id()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4())),
    }
}

/// Extract the sender address (lowercased) and display name.
fn extract_sender(parsed: &mail_parser::Message) -> (String, String) {
    let first = parsed.from().and_then(|addr| addr.first());
    let address = first
        .and_then(|a| a.address.as_ref())
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_else(|| "unknown".into());
    let name = first
        .and_then(|a| a.name.as_ref())
        .map(|s| s.to_string())
        .unwrap_or_else(|| address.clone());
    (address, name)
}

/// Error type for the blocking IMAP fetch.
type FetchError = Box<dyn std::error::Error + Send + Sync>;

/// Fetch replies in the SINCE window via raw IMAP over TLS
/// (blocking — run in spawn_blocking).
fn fetch_window_imap(
    config: &MailboxConfig,
    since: NaiveDate,
    max_messages: usize,
) -> Result<Vec<VendorReply>, FetchError> {
    use std::sync::Arc as StdArc;

    // Connect TCP
    let tcp = TcpStream::connect((&*config.imap_host, config.imap_port)).map_err(|e| {
        MailboxError::Connect {
            host: config.imap_host.clone(),
            reason: e.to_string(),
        }
    })?;
    tcp.set_read_timeout(Some(Duration::from_secs(30)))?;

    // TLS via rustls
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = StdArc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name: rustls::pki_types::ServerName<'_> =
        rustls::pki_types::ServerName::try_from(config.imap_host.clone())
            .map_err(|e| MailboxError::Tls(e.to_string()))?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)
        .map_err(|e| MailboxError::Tls(e.to_string()))?;
    let mut tls = rustls::StreamOwned::new(conn, tcp);

    // ── IMAP helpers ────────────────────────────────────────────────
    let read_line =
        |tls: &mut rustls::StreamOwned<rustls::ClientConnection, TcpStream>| -> Result<String, FetchError> {
            let mut buf = Vec::new();
            loop {
                let mut byte = [0u8; 1];
                match std::io::Read::read(tls, &mut byte) {
                    Ok(0) => return Err("IMAP connection closed".into()),
                    Ok(_) => {
                        buf.push(byte[0]);
                        if buf.ends_with(b"\r\n") {
                            return Ok(String::from_utf8_lossy(&buf).to_string());
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

    let send_cmd =
        |tls: &mut rustls::StreamOwned<rustls::ClientConnection, TcpStream>,
         tag: &str,
         cmd: &str|
         -> Result<Vec<String>, FetchError> {
            let full = format!("{tag} {cmd}\r\n");
            IoWrite::write_all(tls, full.as_bytes())?;
            IoWrite::flush(tls)?;
            let mut lines = Vec::new();
            loop {
                let line = read_line(tls)?;
                let done = line.starts_with(tag);
                lines.push(line);
                if done {
                    break;
                }
            }
            Ok(lines)
        };

    // Read greeting
    let _greeting = read_line(&mut tls)?;

    // Login
    let login_resp = send_cmd(
        &mut tls,
        "A1",
        &format!(
            "LOGIN \"{}\" \"{}\"",
            config.username,
            config.password.expose_secret()
        ),
    )?;
    if !login_resp.last().is_some_and(|l| l.contains("OK")) {
        return Err(MailboxError::Login {
            user: config.username.clone(),
        }
        .into());
    }

    // Select INBOX
    let _select = send_cmd(&mut tls, "A2", "SELECT \"INBOX\"")?;

    // Restrict to the recent window
    let search_resp = send_cmd(
        &mut tls,
        "A3",
        &format!("SEARCH SINCE {}", format_since_date(since)),
    )?;
    let mut ids: Vec<String> = Vec::new();
    for line in &search_resp {
        if line.starts_with("* SEARCH") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() > 2 {
                ids.extend(parts[2..].iter().map(|s| s.to_string()));
            }
        }
    }

    // Only the most recent few — older hits are left for manual entry
    let recent: Vec<String> = ids
        .iter()
        .skip(ids.len().saturating_sub(max_messages))
        .cloned()
        .collect();

    let mut results = Vec::new();
    let mut tag_counter = 4_u32;

    for id in &recent {
        let fetch_tag = format!("A{tag_counter}");
        tag_counter += 1;
        let fetch_resp = match send_cmd(&mut tls, &fetch_tag, &format!("FETCH {id} RFC822")) {
            Ok(resp) => resp,
            Err(e) => {
                // Skip the message, keep the cycle going
                warn!(id = %id, error = %e, "Failed to fetch message");
                continue;
            }
        };

        let raw: String = fetch_resp
            .iter()
            .skip(1)
            .take(fetch_resp.len().saturating_sub(2))
            .cloned()
            .collect();

        if let Some(parsed) = MessageParser::default().parse(raw.as_bytes()) {
            results.push(normalize_message(&parsed));
        }
    }

    // Logout; the TLS stream drops with this scope either way
    let logout_tag = format!("A{tag_counter}");
    let _ = send_cmd(&mut tls, &logout_tag, "LOGOUT");

    Ok(results)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_date_uses_imap_format() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        assert_eq!(format_since_date(date), "6-Aug-2026");
        let jan = NaiveDate::from_ymd_opt(2027, 1, 15).unwrap();
        assert_eq!(format_since_date(jan), "15-Jan-2027");
    }

    #[test]
    fn strip_html_basic() {
        assert_eq!(strip_html("<p>Hello</p>"), "Hello");
    }

    #[test]
    fn strip_html_nested_tags() {
        assert_eq!(
            strip_html("<div><b>Bold</b> and <i>italic</i></div>"),
            "Bold and italic"
        );
    }

    #[test]
    fn strip_html_plain_text_passthrough() {
        assert_eq!(strip_html("No HTML here"), "No HTML here");
    }

    #[test]
    fn strip_html_tags_become_separators() {
        assert_eq!(strip_html("<p>one</p><p>two</p>"), "one two");
    }

    fn parse_raw(raw: &str) -> mail_parser::Message<'_> {
        MessageParser::default()
            .parse(raw.as_bytes())
            .expect("raw email should parse")
    }

    #[test]
    fn normalize_lowercases_sender_and_keeps_name() {
        let raw = "From: Acme Sales <Sales@Acme.COM>\r\n\
                   Subject: Our proposal\r\n\
                   Message-ID: <abc@acme.com>\r\n\
                   \r\n\
                   We offer 20 laptops at $1,200 each.\r\n";
        let parsed = parse_raw(raw);
        let reply = normalize_message(&parsed);
        assert_eq!(reply.from, "sales@acme.com");
        assert_eq!(reply.from_name, "Acme Sales");
        assert_eq!(reply.subject, "Our proposal");
        assert!(reply.body.contains("20 laptops"));
        assert_eq!(reply.message_id, "abc@acme.com");
    }

    #[test]
    fn normalize_falls_back_to_stripped_html_body() {
        let raw = "From: sales@acme.com\r\n\
                   Subject: Proposal\r\n\
                   Content-Type: text/html; charset=utf-8\r\n\
                   \r\n\
                   <html><body><p>Total: <b>$24,000</b></p></body></html>\r\n";
        let parsed = parse_raw(raw);
        let reply = normalize_message(&parsed);
        assert!(reply.body.contains("Total: $24,000"));
        assert!(!reply.body.contains('<'));
    }

    #[test]
    fn normalize_defaults_missing_subject_and_message_id() {
        let raw = "From: sales@acme.com\r\n\r\nhello\r\n";
        let parsed = parse_raw(raw);
        let reply = normalize_message(&parsed);
        assert_eq!(reply.subject, "(no subject)");
        assert!(reply.message_id.starts_with("gen-"));
    }

    #[test]
    fn normalize_uses_address_when_name_missing() {
        let raw = "From: sales@acme.com\r\nSubject: x\r\n\r\nbody\r\n";
        let parsed = parse_raw(raw);
        let reply = normalize_message(&parsed);
        assert_eq!(reply.from_name, "sales@acme.com");
    }
}
