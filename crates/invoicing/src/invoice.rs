use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use schoolerp_core::{
    Aggregate, AggregateRoot, AttachmentId, DomainError, TenantId, typed_aggregate_id,
};
use schoolerp_events::Event;
use schoolerp_school::{StudentSnapshot, TemplateId, TemplateItem, TemplateSnapshot};

use crate::derive;

typed_aggregate_id!(
    /// Invoice identifier (tenant-scoped via `tenant_id` fields in events/commands).
    InvoiceId
);

/// The template an invoice was derived from (id + display name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    pub template_id: TemplateId,
    pub name: String,
}

impl From<&TemplateSnapshot> for TemplateRef {
    fn from(t: &TemplateSnapshot) -> Self {
        Self {
            template_id: t.template_id,
            name: t.name.clone(),
        }
    }
}

/// A successful email send of this invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDelivery {
    pub attachment_id: AttachmentId,
    pub recipient: String,
    pub message_id: String,
    pub sent_at: DateTime<Utc>,
}

/// Aggregate root: Invoice (one student, one optional template).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    tenant_id: Option<TenantId>,
    invoice_number: String,
    student: Option<StudentSnapshot>,
    template: Option<TemplateRef>,
    items: Vec<TemplateItem>,
    date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    amount: u64,
    is_paid: bool,
    deliveries: Vec<InvoiceDelivery>,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            invoice_number: String::new(),
            student: None,
            template: None,
            items: Vec::new(),
            date: None,
            due_date: None,
            amount: 0,
            is_paid: false,
            deliveries: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn invoice_number(&self) -> &str {
        &self.invoice_number
    }

    pub fn student(&self) -> Option<&StudentSnapshot> {
        self.student.as_ref()
    }

    pub fn template(&self) -> Option<&TemplateRef> {
        self.template.as_ref()
    }

    pub fn items(&self) -> &[TemplateItem] {
        &self.items
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn is_paid(&self) -> bool {
        self.is_paid
    }

    pub fn deliveries(&self) -> &[InvoiceDelivery] {
        &self.deliveries
    }

    /// Display name: the template name, empty without a template.
    pub fn name(&self) -> &str {
        self.template.as_ref().map(|t| t.name.as_str()).unwrap_or("")
    }

    pub fn contact_email(&self) -> Option<&str> {
        self.student.as_ref().and_then(|s| s.contact_email.as_deref())
    }

    pub fn combination(&self) -> Option<String> {
        self.student.as_ref().map(|s| {
            derive::combination(&s.name, self.template.as_ref().map(|t| t.name.as_str()))
        })
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateInvoice (one student; the batch fan-out issues one per student).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    /// Already minted by the sequence service (or the placeholder).
    pub invoice_number: String,
    pub student: StudentSnapshot,
    pub template: Option<TemplateSnapshot>,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
    /// Amount in cents; `None` takes the template total.
    pub amount: Option<u64>,
    pub is_paid: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateInvoice (plain field writes; `None` keeps the stored value).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub amount: Option<u64>,
    pub is_paid: Option<bool>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeTemplate (set or unset; recomputes the derived fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTemplate {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub template: Option<TemplateSnapshot>,
    /// Overwrite `amount` with the new template's total.
    pub prefill_amount: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordInvoiceSent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInvoiceSent {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub attachment_id: AttachmentId,
    pub recipient: String,
    pub message_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    CreateInvoice(CreateInvoice),
    UpdateInvoice(UpdateInvoice),
    ChangeTemplate(ChangeTemplate),
    RecordInvoiceSent(RecordInvoiceSent),
}

/// Event: InvoiceCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub student: StudentSnapshot,
    pub template: Option<TemplateRef>,
    pub items: Vec<TemplateItem>,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
    pub amount: u64,
    pub is_paid: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceUpdated (full resulting values of the writable fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceUpdated {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
    pub amount: u64,
    pub is_paid: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceTemplateChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTemplateChanged {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub template: Option<TemplateRef>,
    pub items: Vec<TemplateItem>,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceSent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSent {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub attachment_id: AttachmentId,
    pub recipient: String,
    pub message_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceCreated(InvoiceCreated),
    InvoiceUpdated(InvoiceUpdated),
    InvoiceTemplateChanged(InvoiceTemplateChanged),
    InvoiceSent(InvoiceSent),
}

impl InvoiceEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.tenant_id,
            InvoiceEvent::InvoiceUpdated(e) => e.tenant_id,
            InvoiceEvent::InvoiceTemplateChanged(e) => e.tenant_id,
            InvoiceEvent::InvoiceSent(e) => e.tenant_id,
        }
    }

    pub fn invoice_id(&self) -> InvoiceId {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.invoice_id,
            InvoiceEvent::InvoiceUpdated(e) => e.invoice_id,
            InvoiceEvent::InvoiceTemplateChanged(e) => e.invoice_id,
            InvoiceEvent::InvoiceSent(e) => e.invoice_id,
        }
    }
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceCreated(_) => "school.invoice.created",
            InvoiceEvent::InvoiceUpdated(_) => "school.invoice.updated",
            InvoiceEvent::InvoiceTemplateChanged(_) => "school.invoice.template_changed",
            InvoiceEvent::InvoiceSent(_) => "school.invoice.sent",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceCreated(e) => e.occurred_at,
            InvoiceEvent::InvoiceUpdated(e) => e.occurred_at,
            InvoiceEvent::InvoiceTemplateChanged(e) => e.occurred_at,
            InvoiceEvent::InvoiceSent(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceCreated(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.invoice_number = e.invoice_number.clone();
                self.student = Some(e.student.clone());
                self.template = e.template.clone();
                self.items = e.items.clone();
                self.date = Some(e.date);
                self.due_date = Some(e.due_date);
                self.amount = e.amount;
                self.is_paid = e.is_paid;
                self.created = true;
            }
            InvoiceEvent::InvoiceUpdated(e) => {
                self.date = Some(e.date);
                self.due_date = Some(e.due_date);
                self.amount = e.amount;
                self.is_paid = e.is_paid;
            }
            InvoiceEvent::InvoiceTemplateChanged(e) => {
                self.template = e.template.clone();
                self.items = e.items.clone();
                self.amount = e.amount;
            }
            InvoiceEvent::InvoiceSent(e) => {
                self.deliveries.push(InvoiceDelivery {
                    attachment_id: e.attachment_id,
                    recipient: e.recipient.clone(),
                    message_id: e.message_id.clone(),
                    sent_at: e.occurred_at,
                });
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::CreateInvoice(cmd) => self.handle_create(cmd),
            InvoiceCommand::UpdateInvoice(cmd) => self.handle_update(cmd),
            InvoiceCommand::ChangeTemplate(cmd) => self.handle_change_template(cmd),
            InvoiceCommand::RecordInvoiceSent(cmd) => self.handle_record_sent(cmd),
        }
    }
}

impl Invoice {
    fn ensure_existing(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    /// Stored dates; only `None` before creation.
    fn stored_dates(&self) -> Result<(NaiveDate, NaiveDate), DomainError> {
        match (self.date, self.due_date) {
            (Some(date), Some(due_date)) => Ok((date, due_date)),
            _ => Err(DomainError::invariant("invoice dates missing")),
        }
    }

    fn handle_create(&self, cmd: &CreateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        if cmd.invoice_number.trim().is_empty() {
            return Err(DomainError::validation("invoice number cannot be empty"));
        }
        if let Some(template) = &cmd.template {
            derive::ensure_template_usable(template)?;
        }
        derive::check_due_date(cmd.date, cmd.due_date)?;
        let amount = derive::resolve_amount(cmd.amount, cmd.template.as_ref())?;

        Ok(vec![InvoiceEvent::InvoiceCreated(InvoiceCreated {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            invoice_number: cmd.invoice_number.clone(),
            student: cmd.student.clone(),
            template: cmd.template.as_ref().map(TemplateRef::from),
            items: derive::items_from_template(cmd.template.as_ref()),
            date: cmd.date,
            due_date: cmd.due_date,
            amount,
            is_paid: cmd.is_paid,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.invoice_id)?;
        let (stored_date, stored_due) = self.stored_dates()?;

        let date = cmd.date.unwrap_or(stored_date);
        let due_date = cmd.due_date.unwrap_or(stored_due);
        derive::check_due_date(date, due_date)?;

        let amount = cmd.amount.unwrap_or(self.amount);
        let is_paid = cmd.is_paid.unwrap_or(self.is_paid);

        if date == stored_date
            && due_date == stored_due
            && amount == self.amount
            && is_paid == self.is_paid
        {
            return Ok(vec![]);
        }

        Ok(vec![InvoiceEvent::InvoiceUpdated(InvoiceUpdated {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            date,
            due_date,
            amount,
            is_paid,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_template(&self, cmd: &ChangeTemplate) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.invoice_id)?;
        if let Some(template) = &cmd.template {
            derive::ensure_template_usable(template)?;
        }

        let template = cmd.template.as_ref().map(TemplateRef::from);
        let items = derive::items_from_template(cmd.template.as_ref());
        let amount = match (&cmd.template, cmd.prefill_amount) {
            (Some(t), true) => t
                .total()
                .ok_or_else(|| DomainError::invariant("template total overflow"))?,
            _ => self.amount,
        };

        if template == self.template && items == self.items && amount == self.amount {
            return Ok(vec![]);
        }

        Ok(vec![InvoiceEvent::InvoiceTemplateChanged(InvoiceTemplateChanged {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            template,
            items,
            amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_sent(&self, cmd: &RecordInvoiceSent) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.invoice_id)?;
        if cmd.recipient.trim().is_empty() {
            return Err(DomainError::validation("recipient cannot be empty"));
        }

        Ok(vec![InvoiceEvent::InvoiceSent(InvoiceSent {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            attachment_id: cmd.attachment_id,
            recipient: cmd.recipient.clone(),
            message_id: cmd.message_id.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
