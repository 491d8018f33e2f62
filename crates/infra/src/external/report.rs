//! Report rendering (invoice PDF).

use schoolerp_invoicing::format_amount;

use super::ExternalError;
use super::pdf::{PdfDocument, TextLine};
use crate::projections::InvoiceReadModel;

/// Output of a report render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub trait ReportRenderer: Send + Sync {
    fn has_report(&self, report_ref: &str) -> bool;

    fn render(
        &self,
        report_ref: &str,
        invoices: &[InvoiceReadModel],
    ) -> Result<RenderedReport, ExternalError>;
}

/// Built-in invoice report: one A4 page per invoice.
#[derive(Debug, Clone)]
pub struct PdfInvoiceReport {
    report_ref: String,
    issuer: String,
}

impl PdfInvoiceReport {
    pub fn new(report_ref: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            report_ref: report_ref.into(),
            issuer: issuer.into(),
        }
    }

    fn page(&self, invoice: &InvoiceReadModel) -> Vec<TextLine> {
        let mut lines = vec![
            TextLine::heading(format!("Invoice {}", invoice.invoice_number)),
            TextLine::body(format!("Issued by: {}", self.issuer)),
            TextLine::body(format!("Student: {}", invoice.student.name)),
        ];
        if !invoice.name().is_empty() {
            lines.push(TextLine::body(format!("Template: {}", invoice.name())));
        }
        lines.push(TextLine::body(format!("Invoice date: {}", invoice.date)));
        lines.push(TextLine::body(format!("Due date: {}", invoice.due_date)));
        lines.push(TextLine::body(String::new()));

        for item in &invoice.items {
            lines.push(TextLine::body(format!(
                "{}  {}",
                item.description,
                format_amount(item.amount)
            )));
        }

        lines.push(TextLine::body(String::new()));
        lines.push(TextLine::body(format!("Amount due: {}", format_amount(invoice.amount))));
        lines.push(TextLine::body(if invoice.is_paid { "Status: paid" } else { "Status: open" }));
        lines
    }
}

impl ReportRenderer for PdfInvoiceReport {
    fn has_report(&self, report_ref: &str) -> bool {
        self.report_ref == report_ref
    }

    fn render(
        &self,
        report_ref: &str,
        invoices: &[InvoiceReadModel],
    ) -> Result<RenderedReport, ExternalError> {
        if !self.has_report(report_ref) {
            return Err(ExternalError::MissingReport(report_ref.to_string()));
        }
        if invoices.is_empty() {
            return Err(ExternalError::Render("no invoices to render".to_string()));
        }

        let mut doc = PdfDocument::new();
        for invoice in invoices {
            doc.add_page(self.page(invoice));
        }

        Ok(RenderedReport {
            bytes: doc.to_bytes(),
            content_type: "application/pdf".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use schoolerp_invoicing::{InvoiceId, TemplateRef};
    use schoolerp_school::{StudentId, StudentSnapshot, TemplateId, TemplateItem};

    fn invoice() -> InvoiceReadModel {
        InvoiceReadModel {
            invoice_id: InvoiceId::generate(),
            invoice_number: "INV/00007".to_string(),
            student: StudentSnapshot {
                student_id: StudentId::generate(),
                name: "Ada".to_string(),
                contact_email: None,
            },
            template: Some(TemplateRef {
                template_id: TemplateId::generate(),
                name: "Term 1".to_string(),
            }),
            items: vec![TemplateItem {
                description: "Tuition".to_string(),
                amount: 52_500,
            }],
            date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 9, 30).unwrap(),
            amount: 52_500,
            is_paid: false,
            deliveries: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn renders_a_pdf_mentioning_the_invoice() {
        let report = PdfInvoiceReport::new("school.invoice_report", "Springfield Elementary");
        let rendered = report.render("school.invoice_report", &[invoice()]).unwrap();

        assert_eq!(rendered.content_type, "application/pdf");
        let text = String::from_utf8_lossy(&rendered.bytes);
        assert!(text.starts_with("%PDF-"));
        assert!(text.contains("Invoice INV/00007"));
        assert!(text.contains("Amount due: 525.00"));
    }

    #[test]
    fn unknown_report_ref_is_missing() {
        let report = PdfInvoiceReport::new("school.invoice_report", "School");
        let err = report.render("other", &[invoice()]).unwrap_err();
        assert_eq!(err, ExternalError::MissingReport("other".to_string()));
    }

    #[test]
    fn long_invoices_span_pages_and_keep_accented_names() {
        let mut inv = invoice();
        inv.student.name = "José".to_string();
        inv.items = (0..80)
            .map(|i| TemplateItem {
                description: format!("Activity {i}"),
                amount: 100,
            })
            .collect();
        let report = PdfInvoiceReport::new("school.invoice_report", "School");
        let rendered = report.render("school.invoice_report", &[inv]).unwrap();

        let text = String::from_utf8(rendered.bytes).unwrap();
        assert!(!text.contains("/Count 1 "));
        assert!(text.contains("Student: Jos\\351"));
        assert!(text.contains("Activity 79"));
        assert!(text.contains("Amount due: 525.00"));
        assert!(!text.contains(" 0 Tm "));
    }
}
