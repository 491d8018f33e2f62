//! Collaborators the invoicing service calls out to.
//!
//! Each sits behind a trait so tests can swap in fakes: invoice numbering,
//! report rendering, attachment storage and templated mail.

pub mod attachment;
pub mod mail;
mod pdf;
pub mod report;
pub mod sequence;
pub mod smtp;

use thiserror::Error;

pub use attachment::{Attachment, AttachmentOwner, AttachmentStore, InMemoryAttachmentStore, NewAttachment};
pub use mail::{
    InMemoryMailTransport, MailAttachment, MailTemplate, MailTemplateService, MailTransport,
    OutgoingMail, SentMail, TemplatedMailer,
};
pub use report::{PdfInvoiceReport, RenderedReport, ReportRenderer};
pub use sequence::{InMemorySequenceService, SequenceDefinition, SequenceService};
pub use smtp::{SmtpConfig, SmtpMailTransport};

/// Failure of an external collaborator. Never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExternalError {
    #[error("mail template '{0}' is not configured")]
    MissingTemplate(String),
    #[error("report '{0}' is not configured")]
    MissingReport(String),
    #[error("invoice {0} has no contact email")]
    MissingRecipient(String),
    #[error("report rendering failed: {0}")]
    Render(String),
    #[error("attachment storage failed: {0}")]
    Attachment(String),
    #[error("mail delivery failed: {0}")]
    Delivery(String),
    #[error("sequence failure: {0}")]
    Sequence(String),
}
