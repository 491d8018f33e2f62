//! Templated invoice mail.
//!
//! [`TemplatedMailer`] renders a named Tera template over an invoice, collects
//! the attachments queued for that invoice and hands the message to a
//! [`MailTransport`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tera::{Context, Tera};
use uuid::Uuid;

use schoolerp_core::{AggregateId, AttachmentId, TenantId};
use schoolerp_invoicing::format_amount;

use super::ExternalError;
use super::attachment::AttachmentStore;
use crate::projections::InvoiceReadModel;

/// Subject and body as Tera templates over the invoice fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailTemplate {
    pub subject: String,
    pub body: String,
}

impl MailTemplate {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// The stock "your invoice is attached" message.
    pub fn invoice_default() -> Self {
        Self::new(
            "Invoice {{ invoice_number }}",
            "Dear parent or guardian of {{ student_name }},\n\n\
             Please find attached invoice {{ invoice_number }}\
             {% if name %} ({{ name }}){% endif %} for {{ amount }}, due on {{ due_date }}.\
             \n\nKind regards,\nThe school office\n",
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<MailAttachment>,
}

/// Result of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub recipient: String,
    pub message_id: String,
    pub attachment_ids: Vec<AttachmentId>,
}

/// Delivers a fully built message; returns its message id.
pub trait MailTransport: Send + Sync {
    fn deliver(&self, mail: &OutgoingMail) -> Result<String, ExternalError>;
}

pub trait MailTemplateService: Send + Sync {
    fn has_template(&self, template_ref: &str) -> bool;

    /// Queue an attachment for `record_id`; the next send of that record consumes it.
    fn attach(
        &self,
        tenant_id: TenantId,
        template_ref: &str,
        record_id: AggregateId,
        attachment_id: AttachmentId,
    ) -> Result<(), ExternalError>;

    /// Render `template_ref` for `invoice` and mail it to the invoice's contact email.
    fn send(
        &self,
        tenant_id: TenantId,
        template_ref: &str,
        invoice: &InvoiceReadModel,
    ) -> Result<SentMail, ExternalError>;
}

fn template_context(invoice: &InvoiceReadModel) -> Context {
    let mut context = Context::new();
    context.insert("invoice_number", &invoice.invoice_number);
    context.insert("student_name", &invoice.student.name);
    context.insert("name", invoice.name());
    context.insert("combination", &invoice.combination());
    context.insert("amount", &format_amount(invoice.amount));
    context.insert("date", &invoice.date.to_string());
    context.insert("due_date", &invoice.due_date.to_string());
    context.insert("contact_email", invoice.contact_email().unwrap_or_default());
    context.insert("is_paid", &invoice.is_paid);
    context
}

/// Render a Tera template over the invoice fields. Unknown variables fail.
pub fn render_template(text: &str, invoice: &InvoiceReadModel) -> Result<String, ExternalError> {
    Tera::one_off(text, &template_context(invoice), false)
        .map_err(|e| ExternalError::Render(format!("mail template: {e}")))
}

type PendingKey = (TenantId, String, AggregateId);

pub struct TemplatedMailer {
    from: String,
    templates: HashMap<String, MailTemplate>,
    pending: Mutex<HashMap<PendingKey, Vec<AttachmentId>>>,
    attachments: Arc<dyn AttachmentStore>,
    transport: Arc<dyn MailTransport>,
}

impl TemplatedMailer {
    pub fn new(
        from: impl Into<String>,
        attachments: Arc<dyn AttachmentStore>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            from: from.into(),
            templates: HashMap::new(),
            pending: Mutex::new(HashMap::new()),
            attachments,
            transport,
        }
    }

    pub fn with_template(mut self, template_ref: impl Into<String>, template: MailTemplate) -> Self {
        self.templates.insert(template_ref.into(), template);
        self
    }

    fn take_pending(
        &self,
        tenant_id: TenantId,
        template_ref: &str,
        record_id: AggregateId,
    ) -> Result<Vec<AttachmentId>, ExternalError> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| ExternalError::Delivery("pending attachment lock poisoned".to_string()))?;
        Ok(pending
            .remove(&(tenant_id, template_ref.to_string(), record_id))
            .unwrap_or_default())
    }
}

impl MailTemplateService for TemplatedMailer {
    fn has_template(&self, template_ref: &str) -> bool {
        self.templates.contains_key(template_ref)
    }

    fn attach(
        &self,
        tenant_id: TenantId,
        template_ref: &str,
        record_id: AggregateId,
        attachment_id: AttachmentId,
    ) -> Result<(), ExternalError> {
        if !self.has_template(template_ref) {
            return Err(ExternalError::MissingTemplate(template_ref.to_string()));
        }
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| ExternalError::Delivery("pending attachment lock poisoned".to_string()))?;
        pending
            .entry((tenant_id, template_ref.to_string(), record_id))
            .or_default()
            .push(attachment_id);
        Ok(())
    }

    fn send(
        &self,
        tenant_id: TenantId,
        template_ref: &str,
        invoice: &InvoiceReadModel,
    ) -> Result<SentMail, ExternalError> {
        let template = self
            .templates
            .get(template_ref)
            .ok_or_else(|| ExternalError::MissingTemplate(template_ref.to_string()))?;

        // Queued attachments belong to this send even when it fails.
        let attachment_ids = self.take_pending(tenant_id, template_ref, invoice.invoice_id.0)?;

        let recipient = invoice
            .contact_email()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| ExternalError::MissingRecipient(invoice.invoice_number.clone()))?
            .to_string();

        let mut files = Vec::with_capacity(attachment_ids.len());
        for id in &attachment_ids {
            let stored = self
                .attachments
                .get(tenant_id, *id)?
                .ok_or_else(|| ExternalError::Attachment(format!("attachment {id} not found")))?;
            files.push(MailAttachment {
                file_name: stored.name.clone(),
                content_type: stored.content_type.clone(),
                bytes: stored.decode()?,
            });
        }

        let mail = OutgoingMail {
            from: self.from.clone(),
            to: recipient.clone(),
            subject: render_template(&template.subject, invoice)?,
            body: render_template(&template.body, invoice)?,
            attachments: files,
        };
        let message_id = self.transport.deliver(&mail)?;

        Ok(SentMail {
            recipient,
            message_id,
            attachment_ids,
        })
    }
}

/// Outbox transport: keeps every delivered message in memory.
#[derive(Debug, Default)]
pub struct InMemoryMailTransport {
    outbox: Mutex<Vec<(String, OutgoingMail)>>,
    rejected: Mutex<HashSet<String>>,
}

impl InMemoryMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery to `recipient` fail.
    pub fn reject(&self, recipient: impl Into<String>) {
        if let Ok(mut rejected) = self.rejected.lock() {
            rejected.insert(recipient.into());
        }
    }

    /// Delivered messages, oldest first, with their message ids.
    pub fn outbox(&self) -> Vec<(String, OutgoingMail)> {
        self.outbox.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

impl MailTransport for InMemoryMailTransport {
    fn deliver(&self, mail: &OutgoingMail) -> Result<String, ExternalError> {
        let rejected = self
            .rejected
            .lock()
            .map(|r| r.contains(&mail.to))
            .unwrap_or(false);
        if rejected {
            return Err(ExternalError::Delivery(format!("recipient {} rejected", mail.to)));
        }

        let message_id = format!("<{}@schoolerp.local>", Uuid::now_v7());
        self.outbox
            .lock()
            .map_err(|_| ExternalError::Delivery("outbox lock poisoned".to_string()))?
            .push((message_id.clone(), mail.clone()));
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use schoolerp_invoicing::{InvoiceId, TemplateRef};
    use schoolerp_school::{StudentId, StudentSnapshot, TemplateId};

    use crate::external::attachment::{AttachmentOwner, InMemoryAttachmentStore, NewAttachment};

    const TEMPLATE: &str = "school.email_template_invoice";

    fn invoice(email: Option<&str>) -> InvoiceReadModel {
        InvoiceReadModel {
            invoice_id: InvoiceId::generate(),
            invoice_number: "INV/00003".to_string(),
            student: StudentSnapshot {
                student_id: StudentId::generate(),
                name: "Ada".to_string(),
                contact_email: email.map(str::to_string),
            },
            template: Some(TemplateRef {
                template_id: TemplateId::generate(),
                name: "Term 1".to_string(),
            }),
            items: vec![],
            date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 9, 30).unwrap(),
            amount: 1_250,
            is_paid: false,
            deliveries: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn mailer() -> (TemplatedMailer, Arc<InMemoryAttachmentStore>, Arc<InMemoryMailTransport>) {
        let attachments = Arc::new(InMemoryAttachmentStore::new());
        let transport = Arc::new(InMemoryMailTransport::new());
        let mailer = TemplatedMailer::new("billing@school.local", attachments.clone(), transport.clone())
            .with_template(TEMPLATE, MailTemplate::invoice_default());
        (mailer, attachments, transport)
    }

    fn stored_pdf(
        attachments: &InMemoryAttachmentStore,
        tenant_id: TenantId,
        record_id: AggregateId,
        name: &str,
    ) -> AttachmentId {
        attachments
            .create(
                tenant_id,
                NewAttachment {
                    name: name.to_string(),
                    content_type: "application/pdf".to_string(),
                    payload: format!("%PDF {name}").into_bytes(),
                    owner: AttachmentOwner {
                        model: "school.invoice".to_string(),
                        record_id,
                    },
                },
            )
            .unwrap()
    }

    #[test]
    fn templates_render_invoice_fields() {
        let inv = invoice(Some("p@example.com"));
        assert_eq!(
            render_template("{{ invoice_number }}: {{ combination }} {{amount}}", &inv).unwrap(),
            "INV/00003: Ada-Term 1 12.50"
        );
        assert_eq!(
            render_template("{% if is_paid %}paid{% else %}due {{ due_date }}{% endif %}", &inv).unwrap(),
            "due 2024-09-30"
        );
    }

    #[test]
    fn unknown_variables_and_bad_syntax_fail_to_render() {
        let inv = invoice(Some("p@example.com"));
        assert!(matches!(render_template("{{ nope }}", &inv), Err(ExternalError::Render(_))));
        assert!(matches!(render_template("{{ amount", &inv), Err(ExternalError::Render(_))));
    }

    #[test]
    fn default_template_names_the_invoice() {
        let (mailer, _, transport) = mailer();
        let inv = invoice(Some("p@example.com"));
        mailer.send(TenantId::new(), TEMPLATE, &inv).unwrap();

        let (_, mail) = &transport.outbox()[0];
        assert_eq!(mail.subject, "Invoice INV/00003");
        assert!(mail.body.contains("guardian of Ada,"));
        assert!(mail.body.contains("invoice INV/00003 (Term 1) for 12.50, due on 2024-09-30."));
    }

    #[test]
    fn send_consumes_queued_attachments() {
        let (mailer, attachments, transport) = mailer();
        let tenant_id = TenantId::new();
        let inv = invoice(Some("p@example.com"));
        let id = stored_pdf(&attachments, tenant_id, inv.invoice_id.0, "Invoice.pdf");
        mailer.attach(tenant_id, TEMPLATE, inv.invoice_id.0, id).unwrap();

        let sent = mailer.send(tenant_id, TEMPLATE, &inv).unwrap();
        assert_eq!(sent.recipient, "p@example.com");
        assert_eq!(sent.attachment_ids, vec![id]);

        let second = mailer.send(tenant_id, TEMPLATE, &inv).unwrap();
        assert!(second.attachment_ids.is_empty());

        let outbox = transport.outbox();
        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox[0].1.subject, "Invoice INV/00003");
        assert_eq!(outbox[0].1.attachments[0].bytes, b"%PDF Invoice.pdf");
        assert!(outbox[1].1.attachments.is_empty());
    }

    #[test]
    fn queued_attachments_stay_with_their_invoice() {
        let (mailer, attachments, transport) = mailer();
        let tenant_id = TenantId::new();
        let first = invoice(Some("a@example.com"));
        let second = invoice(Some("b@example.com"));
        let a = stored_pdf(&attachments, tenant_id, first.invoice_id.0, "A.pdf");
        let b = stored_pdf(&attachments, tenant_id, second.invoice_id.0, "B.pdf");
        mailer.attach(tenant_id, TEMPLATE, first.invoice_id.0, a).unwrap();
        mailer.attach(tenant_id, TEMPLATE, second.invoice_id.0, b).unwrap();

        let sent = mailer.send(tenant_id, TEMPLATE, &first).unwrap();
        assert_eq!(sent.attachment_ids, vec![a]);
        let sent = mailer.send(tenant_id, TEMPLATE, &second).unwrap();
        assert_eq!(sent.attachment_ids, vec![b]);

        let names: Vec<Vec<String>> = transport
            .outbox()
            .iter()
            .map(|(_, mail)| mail.attachments.iter().map(|f| f.file_name.clone()).collect())
            .collect();
        assert_eq!(names, vec![vec!["A.pdf".to_string()], vec!["B.pdf".to_string()]]);
    }

    #[test]
    fn missing_template_or_recipient_fails() {
        let (mailer, _, transport) = mailer();
        let tenant_id = TenantId::new();

        assert!(matches!(
            mailer.send(tenant_id, "other", &invoice(Some("p@example.com"))),
            Err(ExternalError::MissingTemplate(_))
        ));
        assert!(matches!(
            mailer.send(tenant_id, TEMPLATE, &invoice(None)),
            Err(ExternalError::MissingRecipient(_))
        ));

        transport.reject("p@example.com");
        assert!(matches!(
            mailer.send(tenant_id, TEMPLATE, &invoice(Some("p@example.com"))),
            Err(ExternalError::Delivery(_))
        ));
        assert!(transport.outbox().is_empty());
    }
}
