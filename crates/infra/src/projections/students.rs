use serde_json::Value as JsonValue;

use schoolerp_core::TenantId;
use schoolerp_events::EventEnvelope;
use schoolerp_school::{StudentEvent, StudentId, StudentSnapshot};

use crate::projections::cursor::{CursorCheck, ProjectionError, StreamCursors};
use crate::read_model::TenantStore;

pub const STUDENT_AGGREGATE_TYPE: &str = "school.student";

/// Queryable student row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentReadModel {
    pub student_id: StudentId,
    pub name: String,
    pub contact_email: Option<String>,
}

impl StudentReadModel {
    pub fn snapshot(&self) -> StudentSnapshot {
        StudentSnapshot {
            student_id: self.student_id,
            name: self.name.clone(),
            contact_email: self.contact_email.clone(),
        }
    }
}

#[derive(Debug)]
pub struct StudentsProjection<S>
where
    S: TenantStore<StudentId, StudentReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> StudentsProjection<S>
where
    S: TenantStore<StudentId, StudentReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, student_id: &StudentId) -> Option<StudentReadModel> {
        self.store.get(tenant_id, student_id)
    }

    /// All students of a tenant, ordered by name.
    pub fn list(&self, tenant_id: TenantId) -> Vec<StudentReadModel> {
        let mut rows = self.store.list(tenant_id);
        rows.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.student_id.0.as_uuid().cmp(b.student_id.0.as_uuid()))
        });
        rows
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != STUDENT_AGGREGATE_TYPE {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(tenant_id, aggregate_id, seq)? == CursorCheck::Skip {
            return Ok(());
        }

        let ev: StudentEvent = serde_json::from_value(envelope.payload().clone()).map_err(|e| {
            ProjectionError::Deserialize {
                aggregate_type: STUDENT_AGGREGATE_TYPE,
                message: e.to_string(),
            }
        })?;
        if ev.tenant_id() != tenant_id || ev.student_id().0 != aggregate_id {
            return Err(ProjectionError::TenantIsolation(
                "student event does not match its envelope".to_string(),
            ));
        }

        let (student_id, name, contact_email) = match ev {
            StudentEvent::StudentRegistered(e) => (e.student_id, e.name, e.contact_email),
            StudentEvent::StudentUpdated(e) => (e.student_id, e.name, e.contact_email),
        };
        self.store.upsert(
            tenant_id,
            student_id,
            StudentReadModel {
                student_id,
                name,
                contact_email,
            },
        );

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }
}
