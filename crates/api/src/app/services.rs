use std::sync::Arc;

use tracing::{debug, warn};

use schoolerp_events::{EventBus, InMemoryEventBus};
use schoolerp_infra::config::AppConfig;
use schoolerp_infra::event_store::InMemoryEventStore;
use schoolerp_infra::external::MailTransport;
use schoolerp_infra::{Collaborators, SchoolInvoicing, SharedEventBus};

/// Everything the handlers need, shared behind an `Arc`.
pub struct AppServices {
    invoicing: SchoolInvoicing,
}

impl AppServices {
    pub fn new(invoicing: SchoolInvoicing) -> Self {
        Self { invoicing }
    }

    pub fn invoicing(&self) -> &SchoolInvoicing {
        &self.invoicing
    }
}

/// In-memory event store and bus, built-in collaborators delivering through
/// `transport`.
pub fn build_services(config: &AppConfig, transport: Arc<dyn MailTransport>) -> Arc<AppServices> {
    let bus: SharedEventBus = Arc::new(InMemoryEventBus::new());
    spawn_event_logger(&bus);

    let collaborators = Collaborators::standard(&config.invoicing, transport);
    let invoicing = SchoolInvoicing::new(
        Arc::new(InMemoryEventStore::new()),
        bus,
        collaborators,
        config.invoicing.clone(),
    );
    Arc::new(AppServices::new(invoicing))
}

/// Background subscriber: log every committed envelope.
///
/// The thread ends when the bus (and with it every sender) is dropped.
fn spawn_event_logger(bus: &SharedEventBus) {
    let sub = bus.subscribe();
    let spawned = std::thread::Builder::new()
        .name("event-log".to_string())
        .spawn(move || {
            while let Ok(env) = sub.recv() {
                // Payloads are externally tagged: `{"InvoiceCreated": {...}}`.
                let event = env
                    .payload()
                    .as_object()
                    .and_then(|o| o.keys().next())
                    .map_or("-", String::as_str);
                debug!(
                    tenant_id = %env.tenant_id(),
                    aggregate_type = env.aggregate_type(),
                    aggregate_id = %env.aggregate_id(),
                    sequence = env.sequence_number(),
                    event,
                    "event committed"
                );
            }
        });
    if let Err(error) = spawned {
        warn!(%error, "failed to start event logger");
    }
}
