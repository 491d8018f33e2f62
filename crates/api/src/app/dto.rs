use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};

use schoolerp_infra::external::Attachment;
use schoolerp_infra::projections::{InvoiceReadModel, StudentReadModel, TemplateReadModel};
use schoolerp_infra::{BatchCreateResult, EmailOutcome, InvoiceCreation};
use schoolerp_invoicing::InvoiceDelivery;
use schoolerp_school::TemplateItem;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterStudentRequest {
    pub name: String,
    pub contact_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStudentRequest {
    pub name: Option<String>,
    pub contact_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    #[serde(default)]
    pub items: Vec<TemplateItem>,
}

#[derive(Debug, Deserialize)]
pub struct ReviseTemplateRequest {
    pub name: Option<String>,
    pub items: Option<Vec<TemplateItem>>,
}

/// Dates are ISO `YYYY-MM-DD`; amounts are in cents.
#[derive(Debug, Deserialize)]
pub struct CreateInvoicesRequest {
    pub student_ids: Vec<String>,
    pub template_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub amount: Option<u64>,
    #[serde(default)]
    pub is_paid: bool,
    pub invoice_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateInvoicesQuery {
    #[serde(default)]
    pub no_email: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateInvoiceRequest {
    pub date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub amount: Option<u64>,
    pub is_paid: Option<bool>,
}

/// `template_id: null` unsets the template.
#[derive(Debug, Deserialize)]
pub struct ChangeTemplateRequest {
    pub template_id: Option<String>,
    #[serde(default)]
    pub prefill_amount: bool,
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn student_to_json(rm: StudentReadModel) -> Value {
    json!({
        "id": rm.student_id.to_string(),
        "name": rm.name,
        "contact_email": rm.contact_email,
    })
}

pub fn template_to_json(rm: TemplateReadModel) -> Value {
    let total = rm.total();
    json!({
        "id": rm.template_id.to_string(),
        "name": rm.name,
        "state": rm.state,
        "items": rm.items,
        "total": total,
    })
}

pub fn invoice_to_json(rm: InvoiceReadModel) -> Value {
    let combination = rm.combination();
    json!({
        "id": rm.invoice_id.to_string(),
        "invoice_number": rm.invoice_number,
        "student_id": rm.student.student_id.to_string(),
        "student_name": rm.student.name,
        "contact_email": rm.student.contact_email,
        "template_id": rm.template.as_ref().map(|t| t.template_id.to_string()),
        "name": rm.template.as_ref().map(|t| t.name.clone()).unwrap_or_default(),
        "combination": combination,
        "items": rm.items,
        "date": rm.date,
        "due_date": rm.due_date,
        "amount": rm.amount,
        "is_paid": rm.is_paid,
        "deliveries": rm.deliveries.into_iter().map(delivery_to_json).collect::<Vec<_>>(),
        "created_at": rm.created_at.to_rfc3339(),
        "updated_at": rm.updated_at.to_rfc3339(),
    })
}

pub fn delivery_to_json(d: InvoiceDelivery) -> Value {
    json!({
        "attachment_id": d.attachment_id.to_string(),
        "recipient": d.recipient,
        "message_id": d.message_id,
        "sent_at": d.sent_at.to_rfc3339(),
    })
}

/// Attachment metadata only; the payload stays server-side.
pub fn attachment_to_json(a: Attachment) -> Value {
    json!({
        "id": a.attachment_id.to_string(),
        "name": a.name,
        "content_type": a.content_type,
        "size": a.size,
        "created_at": a.created_at.to_rfc3339(),
    })
}

fn email_to_json(outcome: EmailOutcome) -> Value {
    match outcome {
        EmailOutcome::Sent(delivery) => json!({ "status": "sent", "delivery": delivery_to_json(delivery) }),
        EmailOutcome::Suppressed => json!({ "status": "suppressed" }),
        EmailOutcome::Failed(message) => json!({ "status": "failed", "message": message }),
    }
}

pub fn batch_to_json(result: BatchCreateResult) -> Value {
    let items = result
        .items
        .into_iter()
        .map(|item| match item {
            InvoiceCreation::Created { invoice, email } => json!({
                "status": "created",
                "invoice": invoice_to_json(invoice),
                "email": email_to_json(email),
            }),
            InvoiceCreation::Failed { student_id, error } => json!({
                "status": "failed",
                "student_id": student_id.to_string(),
                "message": error.to_string(),
            }),
        })
        .collect::<Vec<_>>();
    json!({ "items": items })
}
