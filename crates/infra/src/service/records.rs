//! Students and invoice templates: the records invoices are billed against.

use chrono::Utc;
use tracing::info;

use schoolerp_core::{AggregateId, TenantId};
use schoolerp_school::{
    CreateTemplate, InvoiceTemplate, PublishTemplate, RegisterStudent, ReviseTemplate, Student,
    StudentCommand, StudentId, TemplateCommand, TemplateId, TemplateItem, UpdateStudent,
};

use super::{InvoicingError, SchoolInvoicing};
use crate::projections::{
    STUDENT_AGGREGATE_TYPE, StudentReadModel, TEMPLATE_AGGREGATE_TYPE, TemplateReadModel,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub name: String,
    pub contact_email: Option<String>,
}

/// `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentChanges {
    pub name: Option<String>,
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTemplate {
    pub name: String,
    pub items: Vec<TemplateItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateRevision {
    pub name: Option<String>,
    pub items: Option<Vec<TemplateItem>>,
}

fn make_student(id: AggregateId) -> Student {
    Student::empty(StudentId::new(id))
}

fn make_template(id: AggregateId) -> InvoiceTemplate {
    InvoiceTemplate::empty(TemplateId::new(id))
}

impl SchoolInvoicing {
    pub fn register_student(
        &self,
        tenant_id: TenantId,
        student: NewStudent,
    ) -> Result<StudentReadModel, InvoicingError> {
        let student_id = StudentId::generate();
        let cmd = StudentCommand::RegisterStudent(RegisterStudent {
            tenant_id,
            student_id,
            name: student.name,
            contact_email: student.contact_email,
            occurred_at: Utc::now(),
        });
        self.dispatch(tenant_id, student_id.0, STUDENT_AGGREGATE_TYPE, cmd, make_student)?;

        info!(%tenant_id, %student_id, "student registered");
        self.get_student(tenant_id, student_id)
    }

    pub fn update_student(
        &self,
        tenant_id: TenantId,
        student_id: StudentId,
        changes: StudentChanges,
    ) -> Result<StudentReadModel, InvoicingError> {
        self.get_student(tenant_id, student_id)?;
        let cmd = StudentCommand::UpdateStudent(UpdateStudent {
            tenant_id,
            student_id,
            name: changes.name,
            contact_email: changes.contact_email,
            occurred_at: Utc::now(),
        });
        self.dispatch(tenant_id, student_id.0, STUDENT_AGGREGATE_TYPE, cmd, make_student)?;
        self.get_student(tenant_id, student_id)
    }

    pub fn get_student(
        &self,
        tenant_id: TenantId,
        student_id: StudentId,
    ) -> Result<StudentReadModel, InvoicingError> {
        self.students
            .get(tenant_id, &student_id)
            .ok_or(InvoicingError::UnknownStudent(student_id))
    }

    pub fn list_students(&self, tenant_id: TenantId) -> Vec<StudentReadModel> {
        self.students.list(tenant_id)
    }

    pub fn create_template(
        &self,
        tenant_id: TenantId,
        template: NewTemplate,
    ) -> Result<TemplateReadModel, InvoicingError> {
        let template_id = TemplateId::generate();
        let cmd = TemplateCommand::CreateTemplate(CreateTemplate {
            tenant_id,
            template_id,
            name: template.name,
            items: template.items,
            occurred_at: Utc::now(),
        });
        self.dispatch(tenant_id, template_id.0, TEMPLATE_AGGREGATE_TYPE, cmd, make_template)?;

        info!(%tenant_id, %template_id, "invoice template created");
        self.get_template(tenant_id, template_id)
    }

    pub fn revise_template(
        &self,
        tenant_id: TenantId,
        template_id: TemplateId,
        revision: TemplateRevision,
    ) -> Result<TemplateReadModel, InvoicingError> {
        self.get_template(tenant_id, template_id)?;
        let cmd = TemplateCommand::ReviseTemplate(ReviseTemplate {
            tenant_id,
            template_id,
            name: revision.name,
            items: revision.items,
            occurred_at: Utc::now(),
        });
        self.dispatch(tenant_id, template_id.0, TEMPLATE_AGGREGATE_TYPE, cmd, make_template)?;
        self.get_template(tenant_id, template_id)
    }

    pub fn publish_template(
        &self,
        tenant_id: TenantId,
        template_id: TemplateId,
    ) -> Result<TemplateReadModel, InvoicingError> {
        self.get_template(tenant_id, template_id)?;
        let cmd = TemplateCommand::PublishTemplate(PublishTemplate {
            tenant_id,
            template_id,
            occurred_at: Utc::now(),
        });
        self.dispatch(tenant_id, template_id.0, TEMPLATE_AGGREGATE_TYPE, cmd, make_template)?;

        info!(%tenant_id, %template_id, "invoice template published");
        self.get_template(tenant_id, template_id)
    }

    pub fn get_template(
        &self,
        tenant_id: TenantId,
        template_id: TemplateId,
    ) -> Result<TemplateReadModel, InvoicingError> {
        self.templates
            .get(tenant_id, &template_id)
            .ok_or(InvoicingError::UnknownTemplate(template_id))
    }

    pub fn list_templates(&self, tenant_id: TenantId) -> Vec<TemplateReadModel> {
        self.templates.list(tenant_id)
    }
}
