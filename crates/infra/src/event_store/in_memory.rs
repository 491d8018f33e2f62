use std::collections::HashMap;
use std::sync::RwLock;

use schoolerp_core::{AggregateId, ExpectedVersion, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

type StreamKey = (TenantId, AggregateId);

/// In-memory append-only event store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamKey, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The single stream a batch targets, or why the batch is malformed.
fn batch_stream(events: &[UncommittedEvent]) -> Result<(StreamKey, &str), EventStoreError> {
    let first = &events[0];
    for (idx, e) in events.iter().enumerate().skip(1) {
        if e.tenant_id != first.tenant_id {
            return Err(EventStoreError::TenantIsolation(format!(
                "batch mixes tenants (index {idx})"
            )));
        }
        if e.aggregate_id != first.aggregate_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "batch mixes aggregates (index {idx})"
            )));
        }
        if e.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "batch mixes aggregate types (index {idx})"
            )));
        }
    }
    Ok(((first.tenant_id, first.aggregate_id), first.aggregate_type.as_str()))
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let (key, aggregate_type) = batch_stream(&events)?;
        let aggregate_type = aggregate_type.to_string();

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
        let stream = streams.entry(key).or_default();

        let current = stream.last().map(|e| e.sequence_number).unwrap_or(0);
        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream holds '{}', append tried '{aggregate_type}'",
                    existing.aggregate_type
                )));
            }
        }

        let committed: Vec<StoredEvent> = events
            .into_iter()
            .zip(current + 1..)
            .map(|(e, sequence_number)| StoredEvent {
                event_id: e.event_id,
                tenant_id: e.tenant_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            })
            .collect();

        stream.extend(committed.iter().cloned());
        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        Ok(streams
            .get(&(tenant_id, aggregate_id))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(tenant_id: TenantId, aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "school.test".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({}),
        }
    }

    #[test]
    fn sequence_numbers_continue_the_stream() {
        let store = InMemoryEventStore::new();
        let (t, a) = (TenantId::new(), AggregateId::new());

        let first = store
            .append(vec![event(t, a, "school.invoice")], ExpectedVersion::Exact(0))
            .unwrap();
        let second = store
            .append(
                vec![event(t, a, "school.invoice"), event(t, a, "school.invoice")],
                ExpectedVersion::Exact(1),
            )
            .unwrap();

        assert_eq!(first[0].sequence_number, 1);
        assert_eq!(
            second.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert_eq!(store.load_stream(t, a).unwrap().len(), 3);
    }

    #[test]
    fn stale_expected_version_is_rejected() {
        let store = InMemoryEventStore::new();
        let (t, a) = (TenantId::new(), AggregateId::new());
        store
            .append(vec![event(t, a, "school.invoice")], ExpectedVersion::Exact(0))
            .unwrap();

        let err = store
            .append(vec![event(t, a, "school.invoice")], ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
    }

    #[test]
    fn streams_are_tenant_scoped() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let t1 = TenantId::new();
        store
            .append(vec![event(t1, a, "school.invoice")], ExpectedVersion::Exact(0))
            .unwrap();

        assert!(store.load_stream(TenantId::new(), a).unwrap().is_empty());
    }

    #[test]
    fn mixed_batches_and_type_changes_are_rejected() {
        let store = InMemoryEventStore::new();
        let (t, a) = (TenantId::new(), AggregateId::new());

        let err = store
            .append(
                vec![event(t, a, "school.invoice"), event(TenantId::new(), a, "school.invoice")],
                ExpectedVersion::Any,
            )
            .unwrap_err();
        assert!(matches!(err, EventStoreError::TenantIsolation(_)));

        store
            .append(vec![event(t, a, "school.invoice")], ExpectedVersion::Any)
            .unwrap();
        let err = store
            .append(vec![event(t, a, "school.student")], ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }
}
