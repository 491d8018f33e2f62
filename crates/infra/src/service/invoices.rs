//! Single-invoice reads and writes.

use chrono::{NaiveDate, Utc};

use schoolerp_core::{AggregateId, TenantId};
use schoolerp_invoicing::{ChangeTemplate, Invoice, InvoiceCommand, InvoiceId, UpdateInvoice};
use schoolerp_school::TemplateId;

use super::{InvoicingError, SchoolInvoicing};
use crate::projections::{INVOICE_AGGREGATE_TYPE, InvoiceReadModel};

/// Writable invoice fields; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceChanges {
    pub date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub amount: Option<u64>,
    pub is_paid: Option<bool>,
}

pub(super) fn make_invoice(id: AggregateId) -> Invoice {
    Invoice::empty(InvoiceId::new(id))
}

impl SchoolInvoicing {
    pub fn get_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
    ) -> Result<InvoiceReadModel, InvoicingError> {
        self.invoices
            .get(tenant_id, &invoice_id)
            .ok_or(InvoicingError::UnknownInvoice(invoice_id))
    }

    pub fn list_invoices(&self, tenant_id: TenantId) -> Vec<InvoiceReadModel> {
        self.invoices.list(tenant_id)
    }

    /// The due date is checked against the effective date on every write.
    pub fn update_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        changes: InvoiceChanges,
    ) -> Result<InvoiceReadModel, InvoicingError> {
        self.get_invoice(tenant_id, invoice_id)?;
        let cmd = InvoiceCommand::UpdateInvoice(UpdateInvoice {
            tenant_id,
            invoice_id,
            date: changes.date,
            due_date: changes.due_date,
            amount: changes.amount,
            is_paid: changes.is_paid,
            occurred_at: Utc::now(),
        });
        self.dispatch(tenant_id, invoice_id.0, INVOICE_AGGREGATE_TYPE, cmd, make_invoice)?;
        self.get_invoice(tenant_id, invoice_id)
    }

    /// Set or clear the template; items and name follow, the amount only with `prefill_amount`.
    pub fn change_invoice_template(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        template_id: Option<TemplateId>,
        prefill_amount: bool,
    ) -> Result<InvoiceReadModel, InvoicingError> {
        self.get_invoice(tenant_id, invoice_id)?;
        let template = template_id
            .map(|id| self.get_template(tenant_id, id).map(|t| t.snapshot()))
            .transpose()?;

        let cmd = InvoiceCommand::ChangeTemplate(ChangeTemplate {
            tenant_id,
            invoice_id,
            template,
            prefill_amount,
            occurred_at: Utc::now(),
        });
        self.dispatch(tenant_id, invoice_id.0, INVOICE_AGGREGATE_TYPE, cmd, make_invoice)?;
        self.get_invoice(tenant_id, invoice_id)
    }
}
