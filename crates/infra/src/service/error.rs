use thiserror::Error;

use schoolerp_core::DomainError;
use schoolerp_invoicing::InvoiceId;
use schoolerp_school::{StudentId, TemplateId};

use crate::command_dispatcher::DispatchError;
use crate::external::ExternalError;

/// Failure of a [`SchoolInvoicing`](super::SchoolInvoicing) operation.
#[derive(Debug, Error)]
pub enum InvoicingError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    External(#[from] ExternalError),
    #[error("unknown student {0}")]
    UnknownStudent(StudentId),
    #[error("unknown invoice template {0}")]
    UnknownTemplate(TemplateId),
    #[error("unknown invoice {0}")]
    UnknownInvoice(InvoiceId),
}

impl From<DomainError> for InvoicingError {
    fn from(value: DomainError) -> Self {
        InvoicingError::Dispatch(value.into())
    }
}

impl InvoicingError {
    pub fn is_validation(&self) -> bool {
        matches!(self, InvoicingError::Dispatch(DispatchError::Validation(_)))
    }
}
