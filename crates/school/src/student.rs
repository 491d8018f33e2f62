use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use schoolerp_core::{Aggregate, AggregateRoot, DomainError, TenantId, typed_aggregate_id};
use schoolerp_events::Event;

typed_aggregate_id!(
    /// Student identifier (tenant-scoped via `tenant_id` fields in events/commands).
    StudentId
);

/// The student fields an invoice copies at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSnapshot {
    pub student_id: StudentId,
    pub name: String,
    pub contact_email: Option<String>,
}

/// Aggregate root: Student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    id: StudentId,
    tenant_id: Option<TenantId>,
    name: String,
    contact_email: Option<String>,
    version: u64,
    created: bool,
}

impl Student {
    /// Create an empty, not-yet-registered aggregate instance for rehydration.
    pub fn empty(id: StudentId) -> Self {
        Self {
            id,
            tenant_id: None,
            name: String::new(),
            contact_email: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StudentId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact_email(&self) -> Option<&str> {
        self.contact_email.as_deref()
    }

    pub fn snapshot(&self) -> StudentSnapshot {
        StudentSnapshot {
            student_id: self.id,
            name: self.name.clone(),
            contact_email: self.contact_email.clone(),
        }
    }
}

impl AggregateRoot for Student {
    type Id = StudentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterStudent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterStudent {
    pub tenant_id: TenantId,
    pub student_id: StudentId,
    pub name: String,
    pub contact_email: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateStudent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStudent {
    pub tenant_id: TenantId,
    pub student_id: StudentId,
    /// New name (if None, keep existing).
    pub name: Option<String>,
    /// New contact email (if None, keep existing).
    pub contact_email: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudentCommand {
    RegisterStudent(RegisterStudent),
    UpdateStudent(UpdateStudent),
}

/// Event: StudentRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRegistered {
    pub tenant_id: TenantId,
    pub student_id: StudentId,
    pub name: String,
    pub contact_email: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StudentUpdated (carries the full resulting values).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentUpdated {
    pub tenant_id: TenantId,
    pub student_id: StudentId,
    pub name: String,
    pub contact_email: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudentEvent {
    StudentRegistered(StudentRegistered),
    StudentUpdated(StudentUpdated),
}

impl StudentEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            StudentEvent::StudentRegistered(e) => e.tenant_id,
            StudentEvent::StudentUpdated(e) => e.tenant_id,
        }
    }

    pub fn student_id(&self) -> StudentId {
        match self {
            StudentEvent::StudentRegistered(e) => e.student_id,
            StudentEvent::StudentUpdated(e) => e.student_id,
        }
    }
}

impl Event for StudentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StudentEvent::StudentRegistered(_) => "school.student.registered",
            StudentEvent::StudentUpdated(_) => "school.student.updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StudentEvent::StudentRegistered(e) => e.occurred_at,
            StudentEvent::StudentUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Student {
    type Command = StudentCommand;
    type Event = StudentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StudentEvent::StudentRegistered(e) => {
                self.id = e.student_id;
                self.tenant_id = Some(e.tenant_id);
                self.name = e.name.clone();
                self.contact_email = e.contact_email.clone();
                self.created = true;
            }
            StudentEvent::StudentUpdated(e) => {
                self.name = e.name.clone();
                self.contact_email = e.contact_email.clone();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StudentCommand::RegisterStudent(cmd) => self.handle_register(cmd),
            StudentCommand::UpdateStudent(cmd) => self.handle_update(cmd),
        }
    }
}

/// Minimal shape check: `local@domain`, no whitespace.
fn validate_contact_email(email: &str) -> Result<(), DomainError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "invalid contact email: {email}"
        )))
    }
}

impl Student {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterStudent) -> Result<Vec<StudentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("student already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if let Some(email) = &cmd.contact_email {
            validate_contact_email(email)?;
        }

        Ok(vec![StudentEvent::StudentRegistered(StudentRegistered {
            tenant_id: cmd.tenant_id,
            student_id: cmd.student_id,
            name: cmd.name.trim().to_string(),
            contact_email: cmd.contact_email.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateStudent) -> Result<Vec<StudentEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        if self.id != cmd.student_id {
            return Err(DomainError::invariant("student_id mismatch"));
        }

        let name = match &cmd.name {
            Some(name) if name.trim().is_empty() => {
                return Err(DomainError::validation("name cannot be empty"));
            }
            Some(name) => name.trim().to_string(),
            None => self.name.clone(),
        };
        let contact_email = match &cmd.contact_email {
            Some(email) => {
                validate_contact_email(email)?;
                Some(email.clone())
            }
            None => self.contact_email.clone(),
        };

        if name == self.name && contact_email == self.contact_email {
            return Ok(vec![]);
        }

        Ok(vec![StudentEvent::StudentUpdated(StudentUpdated {
            tenant_id: cmd.tenant_id,
            student_id: cmd.student_id,
            name,
            contact_email,
            occurred_at: cmd.occurred_at,
        })])
    }
}
