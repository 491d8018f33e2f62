//! Read models built from committed events.
//!
//! Every projection is tenant-isolated and idempotent: a per-stream cursor
//! drops envelopes that were already applied.

pub mod cursor;
pub mod invoices;
pub mod students;
pub mod templates;

pub use cursor::{ProjectionError, StreamCursors};
pub use invoices::{INVOICE_AGGREGATE_TYPE, InvoiceReadModel, InvoicesProjection};
pub use students::{STUDENT_AGGREGATE_TYPE, StudentReadModel, StudentsProjection};
pub use templates::{TEMPLATE_AGGREGATE_TYPE, TemplateReadModel, TemplatesProjection};
