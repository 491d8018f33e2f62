use serde_json::Value as JsonValue;

use schoolerp_core::TenantId;
use schoolerp_events::EventEnvelope;
use schoolerp_school::{TemplateEvent, TemplateId, TemplateItem, TemplateSnapshot, TemplateState};

use crate::projections::cursor::{CursorCheck, ProjectionError, StreamCursors};
use crate::read_model::TenantStore;

pub const TEMPLATE_AGGREGATE_TYPE: &str = "school.invoice_template";

/// Queryable invoice template row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateReadModel {
    pub template_id: TemplateId,
    pub name: String,
    pub state: TemplateState,
    pub items: Vec<TemplateItem>,
}

impl TemplateReadModel {
    pub fn total(&self) -> Option<u64> {
        schoolerp_school::items_total(&self.items)
    }

    pub fn snapshot(&self) -> TemplateSnapshot {
        TemplateSnapshot {
            template_id: self.template_id,
            name: self.name.clone(),
            state: self.state,
            items: self.items.clone(),
        }
    }
}

#[derive(Debug)]
pub struct TemplatesProjection<S>
where
    S: TenantStore<TemplateId, TemplateReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> TemplatesProjection<S>
where
    S: TenantStore<TemplateId, TemplateReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, template_id: &TemplateId) -> Option<TemplateReadModel> {
        self.store.get(tenant_id, template_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<TemplateReadModel> {
        let mut rows = self.store.list(tenant_id);
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != TEMPLATE_AGGREGATE_TYPE {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(tenant_id, aggregate_id, seq)? == CursorCheck::Skip {
            return Ok(());
        }

        let ev: TemplateEvent = serde_json::from_value(envelope.payload().clone()).map_err(|e| {
            ProjectionError::Deserialize {
                aggregate_type: TEMPLATE_AGGREGATE_TYPE,
                message: e.to_string(),
            }
        })?;
        if ev.tenant_id() != tenant_id || ev.template_id().0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "template event does not match its envelope".to_string(),
            ));
        }

        match ev {
            TemplateEvent::TemplateCreated(e) => {
                self.store.upsert(
                    tenant_id,
                    e.template_id,
                    TemplateReadModel {
                        template_id: e.template_id,
                        name: e.name,
                        state: TemplateState::Draft,
                        items: e.items,
                    },
                );
            }
            TemplateEvent::TemplateRevised(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.template_id) {
                    rm.name = e.name;
                    rm.items = e.items;
                    self.store.upsert(tenant_id, e.template_id, rm);
                }
            }
            TemplateEvent::TemplatePublished(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.template_id) {
                    rm.state = TemplateState::Published;
                    self.store.upsert(tenant_id, e.template_id, rm);
                }
            }
        }

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }
}
