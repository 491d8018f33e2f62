use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;

use schoolerp_core::TenantId;
use schoolerp_events::EventEnvelope;
use schoolerp_invoicing::{InvoiceDelivery, InvoiceEvent, InvoiceId, TemplateRef, combination};
use schoolerp_school::{StudentEvent, StudentSnapshot, TemplateItem};

use crate::projections::cursor::{CursorCheck, ProjectionError, StreamCursors};
use crate::projections::students::STUDENT_AGGREGATE_TYPE;
use crate::read_model::TenantStore;

pub const INVOICE_AGGREGATE_TYPE: &str = "school.invoice";

/// Queryable invoice row, including the related student fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceReadModel {
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub student: StudentSnapshot,
    pub template: Option<TemplateRef>,
    pub items: Vec<TemplateItem>,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
    pub amount: u64,
    pub is_paid: bool,
    pub deliveries: Vec<InvoiceDelivery>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceReadModel {
    pub fn name(&self) -> &str {
        self.template.as_ref().map(|t| t.name.as_str()).unwrap_or("")
    }

    pub fn contact_email(&self) -> Option<&str> {
        self.student.contact_email.as_deref()
    }

    pub fn combination(&self) -> String {
        combination(&self.student.name, self.template.as_ref().map(|t| t.name.as_str()))
    }
}

/// Invoices read model.
///
/// Consumes invoice events and student events; a student rename or contact
/// change is copied onto every invoice billing that student.
#[derive(Debug)]
pub struct InvoicesProjection<S>
where
    S: TenantStore<InvoiceId, InvoiceReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> InvoicesProjection<S>
where
    S: TenantStore<InvoiceId, InvoiceReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, invoice_id: &InvoiceId) -> Option<InvoiceReadModel> {
        self.store.get(tenant_id, invoice_id)
    }

    /// All invoices of a tenant in creation order.
    pub fn list(&self, tenant_id: TenantId) -> Vec<InvoiceReadModel> {
        let mut rows = self.store.list(tenant_id);
        rows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.invoice_id.0.as_uuid().cmp(b.invoice_id.0.as_uuid()))
        });
        rows
    }

    pub fn find_by_number(&self, tenant_id: TenantId, invoice_number: &str) -> Option<InvoiceReadModel> {
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|rm| rm.invoice_number == invoice_number)
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        match envelope.aggregate_type() {
            INVOICE_AGGREGATE_TYPE => self.apply_invoice(envelope),
            STUDENT_AGGREGATE_TYPE => self.apply_student(envelope),
            _ => Ok(()),
        }
    }

    fn apply_invoice(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(tenant_id, aggregate_id, seq)? == CursorCheck::Skip {
            return Ok(());
        }

        let ev: InvoiceEvent = serde_json::from_value(envelope.payload().clone()).map_err(|e| {
            ProjectionError::Deserialize {
                aggregate_type: INVOICE_AGGREGATE_TYPE,
                message: e.to_string(),
            }
        })?;
        if ev.tenant_id() != tenant_id || ev.invoice_id().0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "invoice event does not match its envelope".to_string(),
            ));
        }

        match ev {
            InvoiceEvent::InvoiceCreated(e) => {
                self.store.upsert(
                    tenant_id,
                    e.invoice_id,
                    InvoiceReadModel {
                        invoice_id: e.invoice_id,
                        invoice_number: e.invoice_number,
                        student: e.student,
                        template: e.template,
                        items: e.items,
                        date: e.date,
                        due_date: e.due_date,
                        amount: e.amount,
                        is_paid: e.is_paid,
                        deliveries: vec![],
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            InvoiceEvent::InvoiceUpdated(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.invoice_id) {
                    rm.date = e.date;
                    rm.due_date = e.due_date;
                    rm.amount = e.amount;
                    rm.is_paid = e.is_paid;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.invoice_id, rm);
                }
            }
            InvoiceEvent::InvoiceTemplateChanged(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.invoice_id) {
                    rm.template = e.template;
                    rm.items = e.items;
                    rm.amount = e.amount;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.invoice_id, rm);
                }
            }
            InvoiceEvent::InvoiceSent(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.invoice_id) {
                    rm.deliveries.push(InvoiceDelivery {
                        attachment_id: e.attachment_id,
                        recipient: e.recipient,
                        message_id: e.message_id,
                        sent_at: e.occurred_at,
                    });
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(tenant_id, e.invoice_id, rm);
                }
            }
        }

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }

    fn apply_student(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(tenant_id, aggregate_id, seq)? == CursorCheck::Skip {
            return Ok(());
        }

        let ev: StudentEvent = serde_json::from_value(envelope.payload().clone()).map_err(|e| {
            ProjectionError::Deserialize {
                aggregate_type: STUDENT_AGGREGATE_TYPE,
                message: e.to_string(),
            }
        })?;

        // Registration precedes every invoice of the student; nothing to copy yet.
        if let StudentEvent::StudentUpdated(e) = ev {
            if e.tenant_id != tenant_id {
                return Err(ProjectionError::TenantIsolation(
                    "student event does not match its envelope".to_string(),
                ));
            }
            for mut rm in self.store.list(tenant_id) {
                if rm.student.student_id != e.student_id {
                    continue;
                }
                rm.student.name = e.name.clone();
                rm.student.contact_email = e.contact_email.clone();
                rm.updated_at = e.occurred_at;
                self.store.upsert(tenant_id, rm.invoice_id, rm);
            }
        }

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }
}
