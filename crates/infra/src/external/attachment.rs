//! Binary attachments linked to a record (rendered invoice PDFs).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};

use schoolerp_core::{AggregateId, AttachmentId, TenantId};

use super::ExternalError;
use crate::read_model::{InMemoryTenantStore, TenantStore};

/// The record an attachment belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttachmentOwner {
    /// Aggregate type of the owner, e.g. `school.invoice`.
    pub model: String,
    pub record_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttachment {
    pub name: String,
    pub content_type: String,
    pub payload: Vec<u8>,
    pub owner: AttachmentOwner,
}

/// A stored attachment. The payload is kept base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub attachment_id: AttachmentId,
    pub name: String,
    pub content_type: String,
    pub owner: AttachmentOwner,
    pub data_base64: String,
    pub size: usize,
    pub created_at: DateTime<Utc>,
}

impl Attachment {
    pub fn decode(&self) -> Result<Vec<u8>, ExternalError> {
        STANDARD
            .decode(&self.data_base64)
            .map_err(|e| ExternalError::Attachment(format!("corrupt payload: {e}")))
    }
}

pub trait AttachmentStore: Send + Sync {
    fn create(&self, tenant_id: TenantId, attachment: NewAttachment) -> Result<AttachmentId, ExternalError>;

    fn get(&self, tenant_id: TenantId, attachment_id: AttachmentId) -> Result<Option<Attachment>, ExternalError>;

    /// Oldest first.
    fn list_for_owner(&self, tenant_id: TenantId, owner: &AttachmentOwner) -> Result<Vec<Attachment>, ExternalError>;
}

#[derive(Debug, Default)]
pub struct InMemoryAttachmentStore {
    rows: InMemoryTenantStore<AttachmentId, Attachment>,
}

impl InMemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttachmentStore for InMemoryAttachmentStore {
    fn create(&self, tenant_id: TenantId, attachment: NewAttachment) -> Result<AttachmentId, ExternalError> {
        if attachment.name.trim().is_empty() {
            return Err(ExternalError::Attachment("attachment name cannot be empty".to_string()));
        }

        let attachment_id = AttachmentId::new();
        self.rows.upsert(
            tenant_id,
            attachment_id,
            Attachment {
                attachment_id,
                name: attachment.name,
                content_type: attachment.content_type,
                owner: attachment.owner,
                data_base64: STANDARD.encode(&attachment.payload),
                size: attachment.payload.len(),
                created_at: Utc::now(),
            },
        );
        Ok(attachment_id)
    }

    fn get(&self, tenant_id: TenantId, attachment_id: AttachmentId) -> Result<Option<Attachment>, ExternalError> {
        Ok(self.rows.get(tenant_id, &attachment_id))
    }

    fn list_for_owner(&self, tenant_id: TenantId, owner: &AttachmentOwner) -> Result<Vec<Attachment>, ExternalError> {
        let mut rows: Vec<Attachment> = self
            .rows
            .list(tenant_id)
            .into_iter()
            .filter(|a| &a.owner == owner)
            .collect();
        rows.sort_by_key(|a| (a.created_at, *a.attachment_id.as_uuid()));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> AttachmentOwner {
        AttachmentOwner {
            model: "school.invoice".to_string(),
            record_id: AggregateId::new(),
        }
    }

    #[test]
    fn payload_round_trips_through_base64() {
        let store = InMemoryAttachmentStore::new();
        let tenant_id = TenantId::new();
        let owner = owner();

        let id = store
            .create(
                tenant_id,
                NewAttachment {
                    name: "Invoice.pdf".to_string(),
                    content_type: "application/pdf".to_string(),
                    payload: b"%PDF-1.4 test".to_vec(),
                    owner: owner.clone(),
                },
            )
            .unwrap();

        let stored = store.get(tenant_id, id).unwrap().unwrap();
        assert_eq!(stored.data_base64, "JVBERi0xLjQgdGVzdA==");
        assert_eq!(stored.decode().unwrap(), b"%PDF-1.4 test");
        assert_eq!(store.list_for_owner(tenant_id, &owner).unwrap().len(), 1);
        assert!(store.list_for_owner(TenantId::new(), &owner).unwrap().is_empty());
        assert!(store.get(TenantId::new(), id).unwrap().is_none());
    }
}
