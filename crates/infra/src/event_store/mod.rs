//! Append-only event store boundary.
//!
//! Tenant-scoped event streams, one per student, template and invoice. Only an
//! in-memory backend ships; the trait keeps the dispatcher storage-agnostic.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
