//! SMTP delivery through `lettre`.

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;
use uuid::Uuid;

use super::ExternalError;
use super::mail::{MailTransport, OutgoingMail};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// STARTTLS relay transport. Sends block the calling thread.
pub struct SmtpMailTransport {
    transport: SmtpTransport,
    message_domain: String,
}

impl SmtpMailTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, ExternalError> {
        info!(host = %config.host, port = config.port, "initializing SMTP transport");

        let mut builder = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| ExternalError::Delivery(format!("failed to create SMTP relay: {e}")))?
            .port(config.port);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            message_domain: config.host.clone(),
        })
    }

    fn build_message(&self, mail: &OutgoingMail, message_id: &str) -> Result<Message, ExternalError> {
        let from: Mailbox = mail
            .from
            .parse()
            .map_err(|e| ExternalError::Delivery(format!("invalid sender '{}': {e}", mail.from)))?;
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| ExternalError::Delivery(format!("invalid recipient '{}': {e}", mail.to)))?;

        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(mail.body.clone()));
        for file in &mail.attachments {
            let content_type = ContentType::parse(&file.content_type).map_err(|e| {
                ExternalError::Delivery(format!("invalid content type '{}': {e}", file.content_type))
            })?;
            parts = parts.singlepart(
                Attachment::new(file.file_name.clone()).body(file.bytes.clone(), content_type),
            );
        }

        Message::builder()
            .from(from)
            .to(to)
            .subject(mail.subject.clone())
            .message_id(Some(message_id.to_string()))
            .multipart(parts)
            .map_err(|e| ExternalError::Delivery(format!("failed to build email: {e}")))
    }
}

impl MailTransport for SmtpMailTransport {
    fn deliver(&self, mail: &OutgoingMail) -> Result<String, ExternalError> {
        let message_id = format!("<{}@{}>", Uuid::now_v7(), self.message_domain);
        let message = self.build_message(mail, &message_id)?;

        self.transport
            .send(&message)
            .map_err(|e| ExternalError::Delivery(format!("SMTP send failed: {e}")))?;
        info!(to = %mail.to, %message_id, "invoice email handed to SMTP relay");
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::mail::MailAttachment;

    fn transport() -> SmtpMailTransport {
        SmtpMailTransport::new(&SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: Some("user".to_string()),
            password: Some("secret".to_string()),
        })
        .unwrap()
    }

    fn mail(to: &str) -> OutgoingMail {
        OutgoingMail {
            from: "billing@school.local".to_string(),
            to: to.to_string(),
            subject: "Invoice INV/00001".to_string(),
            body: "Attached.".to_string(),
            attachments: vec![MailAttachment {
                file_name: "Invoice.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                bytes: b"%PDF-1.4".to_vec(),
            }],
        }
    }

    #[test]
    fn message_carries_headers_and_attachment() {
        let message = transport()
            .build_message(&mail("parent@example.com"), "<id@smtp.example.com>")
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: Invoice INV/00001"));
        assert!(raw.contains("<id@smtp.example.com>"));
        assert!(raw.contains("Invoice.pdf"));
        assert!(raw.contains("application/pdf"));
    }

    #[test]
    fn invalid_recipient_is_a_delivery_error() {
        let err = transport()
            .build_message(&mail("not an address"), "<id@x>")
            .unwrap_err();
        assert!(matches!(err, ExternalError::Delivery(_)));
    }
}
