//! Infrastructure layer: event store, dispatcher, read models, external
//! collaborators, configuration and the invoicing application service.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod external;
pub mod projections;
pub mod read_model;
pub mod service;


pub use service::{
    BatchCreateResult, Collaborators, CreateContext, CreateInvoicesRequest, EmailOutcome,
    InvoiceChanges, InvoiceCreation, InvoicingError, NewStudent, NewTemplate, SchoolInvoicing,
    SharedEventBus, StudentChanges, TemplateRevision,
};
