//! School records that invoices are billed against (event-sourced).
//!
//! - `student`: who is billed, and where the invoice email goes.
//! - `template`: invoice blueprints (name, line items, draft/published state).
//!
//! Pure domain logic only: no IO, no HTTP, no storage.

pub mod student;
pub mod template;

pub use student::{
    RegisterStudent, Student, StudentCommand, StudentEvent, StudentId, StudentRegistered,
    StudentSnapshot, StudentUpdated, UpdateStudent,
};
pub use template::{
    CreateTemplate, InvoiceTemplate, PublishTemplate, ReviseTemplate, TemplateCommand,
    TemplateCreated, TemplateEvent, TemplateId, TemplateItem, TemplatePublished, TemplateRevised,
    TemplateSnapshot, TemplateState, items_total,
};
