//! School invoicing domain module (event-sourced).
//!
//! One invoice bills one student against an optional invoice template. Line
//! items, the display name and the `combination` label are derived from the
//! template and student by the pure functions in [`derive`]; the [`invoice`]
//! aggregate enforces date ordering and keeps the invoice number immutable.

pub mod derive;
pub mod invoice;

pub use derive::{NUMBER_PLACEHOLDER, combination, format_amount};
pub use invoice::{
    ChangeTemplate, CreateInvoice, Invoice, InvoiceCommand, InvoiceCreated, InvoiceDelivery,
    InvoiceEvent, InvoiceId, InvoiceSent, InvoiceTemplateChanged, InvoiceUpdated,
    RecordInvoiceSent, TemplateRef, UpdateInvoice,
};
