//! The school invoicing application service.
//!
//! `SchoolInvoicing` owns the command dispatcher, the read models and the
//! external collaborators. Every committed event is applied to the read models
//! before the call returns, so a caller always reads its own writes.

mod batch;
mod email;
mod error;
mod invoices;
mod records;

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::warn;

use schoolerp_core::{Aggregate, AggregateId, DomainError, TenantId};
use schoolerp_events::{EventEnvelope, InMemoryEventBus};
use schoolerp_invoicing::InvoiceId;
use schoolerp_school::{StudentId, TemplateId};

use crate::command_dispatcher::CommandDispatcher;
use crate::config::InvoicingConfig;
use crate::event_store::{EventStore, StoredEvent};
use crate::external::{
    AttachmentStore, InMemoryAttachmentStore, InMemorySequenceService, MailTemplate,
    MailTemplateService, MailTransport, PdfInvoiceReport, ReportRenderer, SequenceDefinition,
    SequenceService, TemplatedMailer,
};
use crate::projections::{
    InvoiceReadModel, InvoicesProjection, StudentReadModel, StudentsProjection,
    TemplateReadModel, TemplatesProjection,
};
use crate::read_model::InMemoryTenantStore;

pub use batch::{BatchCreateResult, CreateContext, CreateInvoicesRequest, EmailOutcome, InvoiceCreation};
pub use error::InvoicingError;
pub use invoices::InvoiceChanges;
pub use records::{NewStudent, NewTemplate, StudentChanges, TemplateRevision};

pub type SharedEventBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

/// The services invoicing calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub sequences: Arc<dyn SequenceService>,
    pub reports: Arc<dyn ReportRenderer>,
    pub attachments: Arc<dyn AttachmentStore>,
    pub mail: Arc<dyn MailTemplateService>,
}

impl Collaborators {
    /// Built-in collaborators configured from `config`, delivering through `transport`.
    pub fn standard(config: &InvoicingConfig, transport: Arc<dyn MailTransport>) -> Self {
        let sequences = InMemorySequenceService::new().with_sequence(
            config.sequence_code.clone(),
            SequenceDefinition::new(config.number_prefix.clone(), config.number_padding),
        );
        let attachments: Arc<dyn AttachmentStore> = Arc::new(InMemoryAttachmentStore::new());
        let mail = TemplatedMailer::new(config.mail_from.clone(), attachments.clone(), transport)
            .with_template(config.mail_template.clone(), MailTemplate::invoice_default());

        Self {
            sequences: Arc::new(sequences),
            reports: Arc::new(PdfInvoiceReport::new(
                config.invoice_report.clone(),
                config.school_name.clone(),
            )),
            attachments,
            mail: Arc::new(mail),
        }
    }
}

pub struct SchoolInvoicing {
    dispatcher: CommandDispatcher<Arc<dyn EventStore>, SharedEventBus>,
    students: StudentsProjection<InMemoryTenantStore<StudentId, StudentReadModel>>,
    templates: TemplatesProjection<InMemoryTenantStore<TemplateId, TemplateReadModel>>,
    invoices: InvoicesProjection<InMemoryTenantStore<InvoiceId, InvoiceReadModel>>,
    collaborators: Collaborators,
    config: InvoicingConfig,
    /// Held from append until the read models have applied the commit.
    write_lock: Mutex<()>,
}

impl SchoolInvoicing {
    pub fn new(
        store: Arc<dyn EventStore>,
        bus: SharedEventBus,
        collaborators: Collaborators,
        config: InvoicingConfig,
    ) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            students: StudentsProjection::new(InMemoryTenantStore::new()),
            templates: TemplatesProjection::new(InMemoryTenantStore::new()),
            invoices: InvoicesProjection::new(InMemoryTenantStore::new()),
            collaborators,
            config,
            write_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &InvoicingConfig {
        &self.config
    }

    /// Bus receiving every committed envelope.
    pub fn event_bus(&self) -> &SharedEventBus {
        self.dispatcher.bus()
    }

    fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, InvoicingError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: schoolerp_events::Event + Serialize + DeserializeOwned,
    {
        // Projections advance per-stream cursors; commits must reach them in order.
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let committed =
            self.dispatcher
                .dispatch(tenant_id, aggregate_id, aggregate_type, command, make_aggregate)?;
        for stored in &committed {
            self.project(&stored.to_envelope());
        }
        Ok(committed)
    }

    /// Events are already committed; a projection failure is logged, not returned.
    fn project(&self, envelope: &EventEnvelope<JsonValue>) {
        let results = [
            ("students", self.students.apply_envelope(envelope)),
            ("templates", self.templates.apply_envelope(envelope)),
            ("invoices", self.invoices.apply_envelope(envelope)),
        ];
        for (projection, result) in results {
            if let Err(error) = result {
                warn!(
                    projection,
                    tenant_id = %envelope.tenant_id(),
                    aggregate_id = %envelope.aggregate_id(),
                    sequence = envelope.sequence_number(),
                    %error,
                    "projection rejected envelope"
                );
            }
        }
    }
}
