//! Runtime configuration read from environment variables.

use std::net::SocketAddr;

use thiserror::Error;
use tracing::warn;

use crate::external::SmtpConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has an invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Names of the collaborators and formats the invoicing service uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoicingConfig {
    pub sequence_code: String,
    pub number_prefix: String,
    pub number_padding: usize,
    pub mail_template: String,
    pub invoice_report: String,
    pub attachment_name: String,
    pub mail_from: String,
    /// Issuer printed on the invoice PDF.
    pub school_name: String,
}

impl Default for InvoicingConfig {
    fn default() -> Self {
        Self {
            sequence_code: "school.invoice".to_string(),
            number_prefix: "INV/".to_string(),
            number_padding: 5,
            mail_template: "school.email_template_invoice".to_string(),
            invoice_report: "school.invoice_report".to_string(),
            attachment_name: "Invoice.pdf".to_string(),
            mail_from: "billing@school.local".to_string(),
            school_name: "School".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub invoicing: InvoicingConfig,
    /// `None` selects the in-memory outbox.
    pub smtp: Option<SmtpConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = InvoicingConfig::default();
        let text = |key: &str, default: String| lookup(key).unwrap_or(default);

        let bind_addr = parse(&lookup, "SCHOOLERP_BIND_ADDR", "0.0.0.0:8080")?;
        let number_padding = parse(&lookup, "SCHOOLERP_INVOICE_PADDING", "5")?;

        let invoicing = InvoicingConfig {
            sequence_code: text("SCHOOLERP_INVOICE_SEQUENCE", defaults.sequence_code),
            number_prefix: text("SCHOOLERP_INVOICE_PREFIX", defaults.number_prefix),
            number_padding,
            mail_template: text("SCHOOLERP_MAIL_TEMPLATE", defaults.mail_template),
            invoice_report: text("SCHOOLERP_INVOICE_REPORT", defaults.invoice_report),
            attachment_name: text("SCHOOLERP_ATTACHMENT_NAME", defaults.attachment_name),
            mail_from: text("SCHOOLERP_MAIL_FROM", defaults.mail_from),
            school_name: text("SCHOOLERP_SCHOOL_NAME", defaults.school_name),
        };

        let smtp = match lookup("SMTP_HOST") {
            Some(host) if !host.trim().is_empty() => Some(SmtpConfig {
                host,
                port: parse(&lookup, "SMTP_PORT", "587")?,
                username: lookup("SMTP_USERNAME"),
                password: lookup("SMTP_PASSWORD"),
            }),
            _ => {
                warn!("SMTP_HOST not set; invoice emails go to the in-memory outbox");
                None
            }
        };

        Ok(Self {
            bind_addr,
            invoicing,
            smtp,
        })
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value = lookup(key).unwrap_or_else(|| default.to_string());
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.clone(),
        reason: e.to_string(),
    })
}
