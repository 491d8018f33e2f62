//! Creation fan-out: one request naming several students becomes one invoice
//! per student.

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use schoolerp_core::{DomainError, TenantId};
use schoolerp_invoicing::{
    CreateInvoice, InvoiceCommand, InvoiceDelivery, InvoiceId, NUMBER_PLACEHOLDER, derive,
};
use schoolerp_school::{StudentId, TemplateId, TemplateSnapshot};

use super::invoices::make_invoice;
use super::{InvoicingError, SchoolInvoicing};
use crate::projections::{INVOICE_AGGREGATE_TYPE, InvoiceReadModel};

/// Fields shared by every invoice of the batch, plus the students to bill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInvoicesRequest {
    pub student_ids: Vec<StudentId>,
    pub template_id: Option<TemplateId>,
    /// Defaults to today (UTC).
    pub date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    /// Defaults to the template total.
    pub amount: Option<u64>,
    pub is_paid: bool,
    /// Only for a single-student request; otherwise numbers come from the sequence.
    pub invoice_number: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateContext {
    /// Skip the invoice email for every created invoice.
    pub no_email: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailOutcome {
    Sent(InvoiceDelivery),
    Suppressed,
    Failed(String),
}

/// Outcome for one student of the batch.
#[derive(Debug)]
pub enum InvoiceCreation {
    Created {
        invoice: InvoiceReadModel,
        email: EmailOutcome,
    },
    Failed {
        student_id: StudentId,
        error: InvoicingError,
    },
}

/// Per-student outcomes in request order.
#[derive(Debug, Default)]
pub struct BatchCreateResult {
    pub items: Vec<InvoiceCreation>,
}

impl BatchCreateResult {
    pub fn created(&self) -> impl Iterator<Item = &InvoiceReadModel> {
        self.items.iter().filter_map(|item| match item {
            InvoiceCreation::Created { invoice, .. } => Some(invoice),
            InvoiceCreation::Failed { .. } => None,
        })
    }

    /// The record a single-record caller would get back.
    pub fn last_created(&self) -> Option<&InvoiceReadModel> {
        self.created().last()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&StudentId, &InvoicingError)> {
        self.items.iter().filter_map(|item| match item {
            InvoiceCreation::Failed { student_id, error } => Some((student_id, error)),
            InvoiceCreation::Created { .. } => None,
        })
    }
}

/// Input order, duplicates dropped.
fn distinct(student_ids: &[StudentId]) -> Vec<StudentId> {
    let mut seen = HashSet::new();
    student_ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect()
}

impl SchoolInvoicing {
    /// Create one invoice per distinct student, then email each unless
    /// `ctx.no_email`.
    ///
    /// Request-level problems (no students, due date before date, draft or
    /// unknown template, unresolvable amount, misused explicit number) fail the
    /// whole call before anything is written. After that each student gets its
    /// own outcome. A failed email does not undo its invoice.
    pub fn create_invoices(
        &self,
        tenant_id: TenantId,
        request: CreateInvoicesRequest,
        ctx: CreateContext,
    ) -> Result<BatchCreateResult, InvoicingError> {
        let students = distinct(&request.student_ids);
        if students.is_empty() {
            return Err(DomainError::validation("at least one student is required").into());
        }

        let date = request.date.unwrap_or_else(|| Utc::now().date_naive());
        derive::check_due_date(date, request.due_date)?;

        let template = request
            .template_id
            .map(|id| self.get_template(tenant_id, id).map(|t| t.snapshot()))
            .transpose()?;
        if let Some(template) = &template {
            derive::ensure_template_usable(template)?;
        }
        derive::resolve_amount(request.amount, template.as_ref())?;

        if let Some(number) = &request.invoice_number {
            self.check_explicit_number(tenant_id, number, students.len())?;
        }

        let mut result = BatchCreateResult::default();
        for student_id in students {
            let created = self.create_one(tenant_id, student_id, &request, date, template.clone());
            let item = match created {
                Ok(invoice) => {
                    let email = self.email_outcome(tenant_id, &invoice, ctx);
                    InvoiceCreation::Created { invoice, email }
                }
                Err(error) => {
                    warn!(%tenant_id, %student_id, %error, "invoice creation failed for student");
                    InvoiceCreation::Failed { student_id, error }
                }
            };
            result.items.push(item);
        }

        Ok(result)
    }

    fn check_explicit_number(
        &self,
        tenant_id: TenantId,
        number: &str,
        student_count: usize,
    ) -> Result<(), InvoicingError> {
        if number.trim().is_empty() {
            return Err(DomainError::validation("invoice number cannot be empty").into());
        }
        if student_count != 1 {
            return Err(DomainError::validation(
                "an explicit invoice number requires exactly one student",
            )
            .into());
        }
        if number != NUMBER_PLACEHOLDER && self.invoices.find_by_number(tenant_id, number).is_some() {
            return Err(DomainError::conflict(format!("invoice number '{number}' is already used")).into());
        }
        Ok(())
    }

    fn next_invoice_number(&self, tenant_id: TenantId) -> Result<String, InvoicingError> {
        let minted = self
            .collaborators
            .sequences
            .next(tenant_id, &self.config.sequence_code)?;
        Ok(minted.unwrap_or_else(|| {
            warn!(%tenant_id, sequence = %self.config.sequence_code, "sequence unavailable; using placeholder number");
            NUMBER_PLACEHOLDER.to_string()
        }))
    }

    fn create_one(
        &self,
        tenant_id: TenantId,
        student_id: StudentId,
        request: &CreateInvoicesRequest,
        date: NaiveDate,
        template: Option<TemplateSnapshot>,
    ) -> Result<InvoiceReadModel, InvoicingError> {
        let student = self.get_student(tenant_id, student_id)?.snapshot();
        let invoice_number = match &request.invoice_number {
            Some(number) => number.clone(),
            None => self.next_invoice_number(tenant_id)?,
        };

        let invoice_id = InvoiceId::generate();
        let cmd = InvoiceCommand::CreateInvoice(CreateInvoice {
            tenant_id,
            invoice_id,
            invoice_number,
            student,
            template,
            date,
            due_date: request.due_date,
            amount: request.amount,
            is_paid: request.is_paid,
            occurred_at: Utc::now(),
        });
        self.dispatch(tenant_id, invoice_id.0, INVOICE_AGGREGATE_TYPE, cmd, make_invoice)?;

        let invoice = self.get_invoice(tenant_id, invoice_id)?;
        info!(
            %tenant_id,
            %invoice_id,
            %student_id,
            invoice_number = %invoice.invoice_number,
            amount = invoice.amount,
            "invoice created"
        );
        Ok(invoice)
    }

    fn email_outcome(
        &self,
        tenant_id: TenantId,
        invoice: &InvoiceReadModel,
        ctx: CreateContext,
    ) -> EmailOutcome {
        if ctx.no_email {
            return EmailOutcome::Suppressed;
        }
        match self.send_invoice_email(tenant_id, invoice.invoice_id) {
            Ok(delivery) => EmailOutcome::Sent(delivery),
            Err(error) => {
                warn!(
                    %tenant_id,
                    invoice_id = %invoice.invoice_id,
                    %error,
                    "invoice created but email failed"
                );
                EmailOutcome::Failed(error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_keeps_first_occurrence_order() {
        let (a, b, c) = (StudentId::generate(), StudentId::generate(), StudentId::generate());
        assert_eq!(distinct(&[b, a, b, c, a]), vec![b, a, c]);
        assert!(distinct(&[]).is_empty());
    }
}
