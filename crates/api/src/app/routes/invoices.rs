use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use schoolerp_infra::{CreateContext, CreateInvoicesRequest, InvoiceChanges, SchoolInvoicing};
use schoolerp_invoicing::InvoiceId;
use schoolerp_school::{StudentId, TemplateId};

use super::HandlerResult;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_invoices).get(list_invoices))
        .route("/:id", get(get_invoice).patch(update_invoice))
        .route("/:id/template", put(change_template))
        .route("/:id/send", post(send_invoice))
        .route("/:id/attachments", get(list_attachments))
}

/// Run a call that may talk to the mail server off the async workers.
async fn blocking<T, F>(services: Arc<AppServices>, f: F) -> Result<T, axum::response::Response>
where
    T: Send + 'static,
    F: FnOnce(&SchoolInvoicing) -> T + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(services.invoicing()))
        .await
        .map_err(|e| {
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", e.to_string())
        })
}

pub async fn create_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::CreateInvoicesQuery>,
    Json(body): Json<dto::CreateInvoicesRequest>,
) -> HandlerResult {
    let student_ids = body
        .student_ids
        .iter()
        .map(|id| errors::parse_id::<StudentId>(id, "student"))
        .collect::<Result<Vec<_>, _>>()?;
    let template_id = body
        .template_id
        .as_deref()
        .map(|id| errors::parse_id::<TemplateId>(id, "template"))
        .transpose()?;

    let request = CreateInvoicesRequest {
        student_ids,
        template_id,
        date: body.date,
        due_date: body.due_date,
        amount: body.amount,
        is_paid: body.is_paid,
        invoice_number: body.invoice_number,
    };
    let ctx = CreateContext {
        no_email: query.no_email,
    };
    let tenant_id = tenant.tenant_id();

    let result = blocking(services, move |svc| svc.create_invoices(tenant_id, request, ctx))
        .await?
        .map_err(errors::invoicing_error_to_response)?;

    let status = if result.created().next().is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(dto::batch_to_json(result))).into_response())
}

pub async fn update_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateInvoiceRequest>,
) -> HandlerResult {
    let invoice_id: InvoiceId = errors::parse_id(&id, "invoice")?;
    let invoice = services
        .invoicing()
        .update_invoice(
            tenant.tenant_id(),
            invoice_id,
            InvoiceChanges {
                date: body.date,
                due_date: body.due_date,
                amount: body.amount,
                is_paid: body.is_paid,
            },
        )
        .map_err(errors::invoicing_error_to_response)?;
    Ok((StatusCode::OK, Json(dto::invoice_to_json(invoice))).into_response())
}

pub async fn change_template(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeTemplateRequest>,
) -> HandlerResult {
    let invoice_id: InvoiceId = errors::parse_id(&id, "invoice")?;
    let template_id = body
        .template_id
        .as_deref()
        .map(|id| errors::parse_id::<TemplateId>(id, "template"))
        .transpose()?;
    let invoice = services
        .invoicing()
        .change_invoice_template(tenant.tenant_id(), invoice_id, template_id, body.prefill_amount)
        .map_err(errors::invoicing_error_to_response)?;
    Ok((StatusCode::OK, Json(dto::invoice_to_json(invoice))).into_response())
}

pub async fn send_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    let invoice_id: InvoiceId = errors::parse_id(&id, "invoice")?;
    let tenant_id = tenant.tenant_id();
    let delivery = blocking(services, move |svc| svc.send_invoice_email(tenant_id, invoice_id))
        .await?
        .map_err(errors::invoicing_error_to_response)?;
    Ok((StatusCode::OK, Json(dto::delivery_to_json(delivery))).into_response())
}

pub async fn list_attachments(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    let invoice_id: InvoiceId = errors::parse_id(&id, "invoice")?;
    let items = services
        .invoicing()
        .list_invoice_attachments(tenant.tenant_id(), invoice_id)
        .map_err(errors::invoicing_error_to_response)?
        .into_iter()
        .map(dto::attachment_to_json)
        .collect::<Vec<_>>();
    Ok((StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response())
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    let invoice_id: InvoiceId = errors::parse_id(&id, "invoice")?;
    let invoice = services
        .invoicing()
        .get_invoice(tenant.tenant_id(), invoice_id)
        .map_err(errors::invoicing_error_to_response)?;
    Ok((StatusCode::OK, Json(dto::invoice_to_json(invoice))).into_response())
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let items = services
        .invoicing()
        .list_invoices(tenant.tenant_id())
        .into_iter()
        .map(dto::invoice_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
