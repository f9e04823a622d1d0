//! Outbound solicitation mail — SMTP via lettre.
//!
//! Bodies are plain text: vendors reply in free text anyway, and the
//! extraction step never sees the outbound formatting.

use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::info;

use crate::error::MailboxError;
use crate::mailbox::MailboxConfig;
use crate::model::{Rfp, Vendor};

/// Sends RFP solicitations to vendors.
pub struct RfpMailer {
    config: MailboxConfig,
}

impl RfpMailer {
    pub fn new(config: MailboxConfig) -> Self {
        Self { config }
    }

    /// Send one solicitation. Errors are per-vendor; callers aggregate
    /// them without aborting the rest of the batch.
    pub fn send_rfp(&self, vendor: &Vendor, rfp: &Rfp) -> Result<(), MailboxError> {
        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&self.config.smtp_host)
            .map_err(|e| MailboxError::SendFailed {
                to: vendor.email.clone(),
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        let email = Message::builder()
            .from(self.config.from_address.parse().map_err(|e| {
                MailboxError::InvalidAddress {
                    address: self.config.from_address.clone(),
                    reason: format!("{e}"),
                }
            })?)
            .to(vendor
                .email
                .parse()
                .map_err(|e| MailboxError::InvalidAddress {
                    address: vendor.email.clone(),
                    reason: format!("{e}"),
                })?)
            .subject(format!("RFP: {} - Response Required", rfp.title))
            .body(format_rfp_body(rfp))
            .map_err(|e| MailboxError::SendFailed {
                to: vendor.email.clone(),
                reason: format!("Failed to build email: {e}"),
            })?;

        transport.send(&email).map_err(|e| MailboxError::SendFailed {
            to: vendor.email.clone(),
            reason: format!("SMTP send failed: {e}"),
        })?;

        info!(vendor = %vendor.name, to = %vendor.email, "Solicitation sent");
        Ok(())
    }
}

/// Render the plain-text solicitation body.
pub fn format_rfp_body(rfp: &Rfp) -> String {
    let mut body = String::with_capacity(1024);

    body.push_str(&format!("Request for Proposal: {}\n\n", rfp.title));
    body.push_str(&format!("Description:\n{}\n", rfp.description));

    if !rfp.requirements.items.is_empty() {
        body.push_str("\nRequired items:\n");
        for item in &rfp.requirements.items {
            body.push_str(&format!(
                "  - {} x {} ({})\n",
                item.quantity, item.name, item.specifications
            ));
        }
    }

    if !rfp.requirements.additional_requirements.is_empty() {
        body.push_str("\nAdditional requirements:\n");
        for req in &rfp.requirements.additional_requirements {
            body.push_str(&format!("  - {req}\n"));
        }
    }

    if let Some(budget) = rfp.budget {
        body.push_str(&format!("\nBudget: ${budget}\n"));
    }
    if let Some(deadline) = rfp.delivery_deadline {
        body.push_str(&format!("Delivery deadline: {deadline}\n"));
    }
    if let Some(ref terms) = rfp.payment_terms {
        body.push_str(&format!("Payment terms: {terms}\n"));
    }
    if let Some(ref terms) = rfp.warranty_terms {
        body.push_str(&format!("Warranty requirements: {terms}\n"));
    }

    body.push_str(
        "\nHow to respond: reply to this email with detailed pricing for each item, \
         total cost, delivery timeline, warranty terms, payment terms, and any \
         additional information or alternatives you recommend.\n",
    );

    body
}
