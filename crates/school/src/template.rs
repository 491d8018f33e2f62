use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use schoolerp_core::{Aggregate, AggregateRoot, DomainError, TenantId, typed_aggregate_id};
use schoolerp_events::Event;

typed_aggregate_id!(
    /// Invoice template identifier.
    TemplateId
);

/// Template lifecycle. Only published templates can be billed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateState {
    Draft,
    Published,
}

/// One billable line of a template (tuition, lab fee, bus pass, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateItem {
    pub description: String,
    /// Amount in smallest currency unit (e.g., cents).
    pub amount: u64,
}

/// Sum of item amounts, `None` on overflow.
pub fn items_total(items: &[TemplateItem]) -> Option<u64> {
    items
        .iter()
        .try_fold(0u64, |acc, item| acc.checked_add(item.amount))
}

/// The template fields an invoice derives from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSnapshot {
    pub template_id: TemplateId,
    pub name: String,
    pub state: TemplateState,
    pub items: Vec<TemplateItem>,
}

impl TemplateSnapshot {
    pub fn total(&self) -> Option<u64> {
        items_total(&self.items)
    }
}

/// Aggregate root: InvoiceTemplate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceTemplate {
    id: TemplateId,
    tenant_id: Option<TenantId>,
    name: String,
    items: Vec<TemplateItem>,
    state: TemplateState,
    version: u64,
    created: bool,
}

impl InvoiceTemplate {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: TemplateId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            items: Vec::new(),
            state: TemplateState::Draft,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> TemplateId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[TemplateItem] {
        &self.items
    }

    pub fn state(&self) -> TemplateState {
        self.state
    }

    pub fn total(&self) -> Option<u64> {
        items_total(&self.items)
    }

    pub fn snapshot(&self) -> TemplateSnapshot {
        TemplateSnapshot {
            template_id: self.id,
            name: self.name.clone(),
            state: self.state,
            items: self.items.clone(),
        }
    }
}

impl AggregateRoot for InvoiceTemplate {
    type Id = TemplateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateTemplate (starts in draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTemplate {
    pub tenant_id: TenantId,
    pub template_id: TemplateId,
    pub name: String,
    pub items: Vec<TemplateItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReviseTemplate (draft only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseTemplate {
    pub tenant_id: TenantId,
    pub template_id: TemplateId,
    pub name: Option<String>,
    pub items: Option<Vec<TemplateItem>>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PublishTemplate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTemplate {
    pub tenant_id: TenantId,
    pub template_id: TemplateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateCommand {
    CreateTemplate(CreateTemplate),
    ReviseTemplate(ReviseTemplate),
    PublishTemplate(PublishTemplate),
}

/// Event: TemplateCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateCreated {
    pub tenant_id: TenantId,
    pub template_id: TemplateId,
    pub name: String,
    pub items: Vec<TemplateItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TemplateRevised (full resulting name + items).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRevised {
    pub tenant_id: TenantId,
    pub template_id: TemplateId,
    pub name: String,
    pub items: Vec<TemplateItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TemplatePublished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatePublished {
    pub tenant_id: TenantId,
    pub template_id: TemplateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateEvent {
    TemplateCreated(TemplateCreated),
    TemplateRevised(TemplateRevised),
    TemplatePublished(TemplatePublished),
}

impl TemplateEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            TemplateEvent::TemplateCreated(e) => e.tenant_id,
            TemplateEvent::TemplateRevised(e) => e.tenant_id,
            TemplateEvent::TemplatePublished(e) => e.tenant_id,
        }
    }

    pub fn template_id(&self) -> TemplateId {
        match self {
            TemplateEvent::TemplateCreated(e) => e.template_id,
            TemplateEvent::TemplateRevised(e) => e.template_id,
            TemplateEvent::TemplatePublished(e) => e.template_id,
        }
    }
}

impl Event for TemplateEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TemplateEvent::TemplateCreated(_) => "school.invoice_template.created",
            TemplateEvent::TemplateRevised(_) => "school.invoice_template.revised",
            TemplateEvent::TemplatePublished(_) => "school.invoice_template.published",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TemplateEvent::TemplateCreated(e) => e.occurred_at,
            TemplateEvent::TemplateRevised(e) => e.occurred_at,
            TemplateEvent::TemplatePublished(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InvoiceTemplate {
    type Command = TemplateCommand;
    type Event = TemplateEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TemplateEvent::TemplateCreated(e) => {
                self.id = e.template_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.items = e.items.clone();
                self.state = TemplateState::Draft;
                self.created = true;
            }
            TemplateEvent::TemplateRevised(e) => {
                self.name = e.name.clone();
                self.items = e.items.clone();
            }
            TemplateEvent::TemplatePublished(_) => {
                self.state = TemplateState::Published;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TemplateCommand::CreateTemplate(cmd) => self.handle_create(cmd),
            TemplateCommand::ReviseTemplate(cmd) => self.handle_revise(cmd),
            TemplateCommand::PublishTemplate(cmd) => self.handle_publish(cmd),
        }
    }
}

fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("template name cannot be empty"));
    }
    Ok(())
}

fn validate_items(items: &[TemplateItem]) -> Result<(), DomainError> {
    for (idx, item) in items.iter().enumerate() {
        if item.description.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "template item {} has an empty description",
                idx + 1
            )));
        }
        if item.amount == 0 {
            return Err(DomainError::validation(format!(
                "template item {} amount must be positive",
                idx + 1
            )));
        }
    }
    if items_total(items).is_none() {
        return Err(DomainError::invariant("template total overflow"));
    }
    Ok(())
}

impl InvoiceTemplate {
    fn ensure_existing(&self, tenant_id: TenantId, template_id: TemplateId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != template_id {
            return Err(DomainError::invariant("template_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateTemplate) -> Result<Vec<TemplateEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("template already exists"));
        }
        validate_name(&cmd.name)?;
        validate_items(&cmd.items)?;

        Ok(vec![TemplateEvent::TemplateCreated(TemplateCreated {
            tenant_id: cmd.tenant_id,
            template_id: cmd.template_id,
            name: cmd.name.trim().to_string(),
            items: cmd.items.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise(&self, cmd: &ReviseTemplate) -> Result<Vec<TemplateEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.template_id)?;
        if self.state != TemplateState::Draft {
            return Err(DomainError::invariant(
                "published templates cannot be revised",
            ));
        }

        let name = match &cmd.name {
            Some(name) => {
                validate_name(name)?;
                name.trim().to_string()
            }
            None => self.name.clone(),
        };
        let items = match &cmd.items {
            Some(items) => {
                validate_items(items)?;
                items.clone()
            }
            None => self.items.clone(),
        };

        Ok(vec![TemplateEvent::TemplateRevised(TemplateRevised {
            tenant_id: cmd.tenant_id,
            template_id: cmd.template_id,
            name,
            items,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_publish(&self, cmd: &PublishTemplate) -> Result<Vec<TemplateEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.template_id)?;
        if self.state == TemplateState::Published {
            return Err(DomainError::conflict("template is already published"));
        }
        if self.items.is_empty() {
            return Err(DomainError::validation(
                "cannot publish a template without items",
            ));
        }

        Ok(vec![TemplateEvent::TemplatePublished(TemplatePublished {
            tenant_id: cmd.tenant_id,
            template_id: cmd.template_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
