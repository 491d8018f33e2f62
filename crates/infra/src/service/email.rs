//! The "send invoice by email" action.

use chrono::Utc;
use tracing::info;

use schoolerp_core::TenantId;
use schoolerp_invoicing::{InvoiceCommand, InvoiceDelivery, InvoiceId, RecordInvoiceSent};

use super::invoices::make_invoice;
use super::{InvoicingError, SchoolInvoicing};
use crate::external::{Attachment, AttachmentOwner, ExternalError, NewAttachment};
use crate::projections::INVOICE_AGGREGATE_TYPE;

fn invoice_owner(invoice_id: InvoiceId) -> AttachmentOwner {
    AttachmentOwner {
        model: INVOICE_AGGREGATE_TYPE.to_string(),
        record_id: invoice_id.0,
    }
}

impl SchoolInvoicing {
    /// Render the invoice PDF, store it as an attachment of the invoice, mail
    /// it to the student's contact email and record the delivery. No retry.
    pub fn send_invoice_email(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
    ) -> Result<InvoiceDelivery, InvoicingError> {
        let invoice = self.get_invoice(tenant_id, invoice_id)?;
        let collaborators = &self.collaborators;
        let template_ref = self.config.mail_template.as_str();
        let report_ref = self.config.invoice_report.as_str();

        if !collaborators.mail.has_template(template_ref) {
            return Err(ExternalError::MissingTemplate(template_ref.to_string()).into());
        }
        if !collaborators.reports.has_report(report_ref) {
            return Err(ExternalError::MissingReport(report_ref.to_string()).into());
        }

        let rendered = collaborators
            .reports
            .render(report_ref, std::slice::from_ref(&invoice))?;
        let attachment_id = collaborators.attachments.create(
            tenant_id,
            NewAttachment {
                name: self.config.attachment_name.clone(),
                content_type: rendered.content_type,
                payload: rendered.bytes,
                owner: invoice_owner(invoice_id),
            },
        )?;

        collaborators
            .mail
            .attach(tenant_id, template_ref, invoice_id.0, attachment_id)?;
        let sent = collaborators.mail.send(tenant_id, template_ref, &invoice)?;

        let occurred_at = Utc::now();
        let cmd = InvoiceCommand::RecordInvoiceSent(RecordInvoiceSent {
            tenant_id,
            invoice_id,
            attachment_id,
            recipient: sent.recipient.clone(),
            message_id: sent.message_id.clone(),
            occurred_at,
        });
        self.dispatch(tenant_id, invoice_id.0, INVOICE_AGGREGATE_TYPE, cmd, make_invoice)?;

        info!(
            %tenant_id,
            %invoice_id,
            recipient = %sent.recipient,
            message_id = %sent.message_id,
            "invoice email sent"
        );
        Ok(InvoiceDelivery {
            attachment_id,
            recipient: sent.recipient,
            message_id: sent.message_id,
            sent_at: occurred_at,
        })
    }

    pub fn list_invoice_attachments(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
    ) -> Result<Vec<Attachment>, InvoicingError> {
        self.get_invoice(tenant_id, invoice_id)?;
        Ok(self
            .collaborators
            .attachments
            .list_for_owner(tenant_id, &invoice_owner(invoice_id))?)
    }
}
