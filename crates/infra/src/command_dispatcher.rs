//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the (tenant, aggregate) stream
//!   ↓
//! 2. Rehydrate the aggregate from history
//!   ↓
//! 3. Handle the command (pure decision, produces events)
//!   ↓
//! 4. Append with ExpectedVersion::Exact(stream version)
//!   ↓
//! 5. Publish committed envelopes to the bus
//! ```
//!
//! The dispatcher does no IO itself; it composes an [`EventStore`] and an
//! [`EventBus`]. Publication happens only after a successful append.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use schoolerp_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use schoolerp_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Stale aggregate version or duplicate creation.
    #[error("conflict: {0}")]
    Concurrency(String),
    /// A loaded stream contained another tenant's or aggregate's events.
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("not found")]
    NotFound,
    /// Historical payloads no longer match the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    #[error(transparent)]
    Store(EventStoreError),
    /// Events are persisted but publication failed (at-least-once).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                DispatchError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::NotFound => DispatchError::NotFound,
        }
    }
}

/// Reusable command execution engine, generic over store and bus.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run `command` against the aggregate `aggregate_id` of `tenant_id`.
    ///
    /// Returns the committed events (empty when the command was a no-op). The
    /// caller feeds them to its read models.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: schoolerp_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(history.last().map_or(0, |e| e.sequence_number));

        let mut aggregate = make_aggregate(aggregate_id);
        for stored in &history {
            let ev: A::Event = serde_json::from_value(stored.payload.clone())
                .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
            aggregate.apply(&ev);
        }

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    tenant_id,
                    aggregate_id,
                    aggregate_type,
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Rebuild an aggregate's current state without issuing a command.
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Option<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        if history.is_empty() {
            return Ok(None);
        }
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        for stored in &history {
            let ev: A::Event = serde_json::from_value(stored.payload.clone())
                .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
            aggregate.apply(&ev);
        }
        Ok(Some(aggregate))
    }
}

/// Guard against a backend returning foreign or out-of-order events.
fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use schoolerp_events::InMemoryEventBus;
    use schoolerp_school::{RegisterStudent, Student, StudentCommand, StudentId};

    use crate::event_store::InMemoryEventStore;

    type Dispatcher =
        CommandDispatcher<InMemoryEventStore, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn register(tenant_id: TenantId, student_id: StudentId, name: &str) -> StudentCommand {
        StudentCommand::RegisterStudent(RegisterStudent {
            tenant_id,
            student_id,
            name: name.to_string(),
            contact_email: None,
            occurred_at: Utc::now(),
        })
    }

    fn dispatcher() -> (Dispatcher, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>) {
        let bus = Arc::new(InMemoryEventBus::new());
        (CommandDispatcher::new(InMemoryEventStore::new(), bus.clone()), bus)
    }

    #[test]
    fn dispatch_appends_and_publishes() {
        let (dispatcher, bus) = dispatcher();
        let sub = bus.subscribe();
        let tenant_id = TenantId::new();
        let student_id = StudentId::generate();

        let committed = dispatcher
            .dispatch(
                tenant_id,
                student_id.0,
                "school.student",
                register(tenant_id, student_id, "Ada"),
                |id| Student::empty(StudentId::new(id)),
            )
            .unwrap();

        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].sequence_number, 1);
        let env = sub.try_recv().unwrap();
        assert_eq!(env.aggregate_id(), student_id.0);
        assert_eq!(env.aggregate_type(), "school.student");
    }

    #[test]
    fn domain_rejection_maps_to_dispatch_error() {
        let (dispatcher, _) = dispatcher();
        let tenant_id = TenantId::new();
        let student_id = StudentId::generate();
        let make = |id| Student::empty(StudentId::new(id));

        dispatcher
            .dispatch(tenant_id, student_id.0, "school.student", register(tenant_id, student_id, "Ada"), make)
            .unwrap();
        let err = dispatcher
            .dispatch(tenant_id, student_id.0, "school.student", register(tenant_id, student_id, "Ada"), make)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Concurrency(_)));

        let other = StudentId::generate();
        let err = dispatcher
            .dispatch(tenant_id, other.0, "school.student", register(tenant_id, other, "  "), make)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[test]
    fn load_rehydrates_or_reports_absence() {
        let (dispatcher, _) = dispatcher();
        let tenant_id = TenantId::new();
        let student_id = StudentId::generate();
        let make = |id| Student::empty(StudentId::new(id));

        assert!(dispatcher.load(tenant_id, student_id.0, make).unwrap().is_none());

        dispatcher
            .dispatch(tenant_id, student_id.0, "school.student", register(tenant_id, student_id, "Ada"), make)
            .unwrap();
        let student = dispatcher.load(tenant_id, student_id.0, make).unwrap().unwrap();
        assert_eq!(student.name(), "Ada");
        assert!(dispatcher.load(TenantId::new(), student_id.0, make).unwrap().is_none());
    }
}
