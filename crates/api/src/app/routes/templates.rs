use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use schoolerp_infra::{NewTemplate, TemplateRevision};
use schoolerp_school::TemplateId;

use super::HandlerResult;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_template).get(list_templates))
        .route("/:id", get(get_template).put(revise_template))
        .route("/:id/publish", post(publish_template))
}

pub async fn create_template(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreateTemplateRequest>,
) -> HandlerResult {
    let template = services
        .invoicing()
        .create_template(
            tenant.tenant_id(),
            NewTemplate {
                name: body.name,
                items: body.items,
            },
        )
        .map_err(errors::invoicing_error_to_response)?;
    Ok((StatusCode::CREATED, Json(dto::template_to_json(template))).into_response())
}

pub async fn revise_template(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReviseTemplateRequest>,
) -> HandlerResult {
    let template_id: TemplateId = errors::parse_id(&id, "template")?;
    let template = services
        .invoicing()
        .revise_template(
            tenant.tenant_id(),
            template_id,
            TemplateRevision {
                name: body.name,
                items: body.items,
            },
        )
        .map_err(errors::invoicing_error_to_response)?;
    Ok((StatusCode::OK, Json(dto::template_to_json(template))).into_response())
}

pub async fn publish_template(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    let template_id: TemplateId = errors::parse_id(&id, "template")?;
    let template = services
        .invoicing()
        .publish_template(tenant.tenant_id(), template_id)
        .map_err(errors::invoicing_error_to_response)?;
    Ok((StatusCode::OK, Json(dto::template_to_json(template))).into_response())
}

pub async fn get_template(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    let template_id: TemplateId = errors::parse_id(&id, "template")?;
    let template = services
        .invoicing()
        .get_template(tenant.tenant_id(), template_id)
        .map_err(errors::invoicing_error_to_response)?;
    Ok((StatusCode::OK, Json(dto::template_to_json(template))).into_response())
}

pub async fn list_templates(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let items = services
        .invoicing()
        .list_templates(tenant.tenant_id())
        .into_iter()
        .map(dto::template_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
