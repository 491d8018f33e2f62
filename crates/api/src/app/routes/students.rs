use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use schoolerp_infra::{NewStudent, StudentChanges};
use schoolerp_school::StudentId;

use super::HandlerResult;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_student).get(list_students))
        .route("/:id", get(get_student).patch(update_student))
}

pub async fn register_student(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::RegisterStudentRequest>,
) -> HandlerResult {
    let student = services
        .invoicing()
        .register_student(
            tenant.tenant_id(),
            NewStudent {
                name: body.name,
                contact_email: body.contact_email,
            },
        )
        .map_err(errors::invoicing_error_to_response)?;
    Ok((StatusCode::CREATED, Json(dto::student_to_json(student))).into_response())
}

pub async fn update_student(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateStudentRequest>,
) -> HandlerResult {
    let student_id: StudentId = errors::parse_id(&id, "student")?;
    let student = services
        .invoicing()
        .update_student(
            tenant.tenant_id(),
            student_id,
            StudentChanges {
                name: body.name,
                contact_email: body.contact_email,
            },
        )
        .map_err(errors::invoicing_error_to_response)?;
    Ok((StatusCode::OK, Json(dto::student_to_json(student))).into_response())
}

pub async fn get_student(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    let student_id: StudentId = errors::parse_id(&id, "student")?;
    let student = services
        .invoicing()
        .get_student(tenant.tenant_id(), student_id)
        .map_err(errors::invoicing_error_to_response)?;
    Ok((StatusCode::OK, Json(dto::student_to_json(student))).into_response())
}

pub async fn list_students(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let items = services
        .invoicing()
        .list_students(tenant.tenant_id())
        .into_iter()
        .map(dto::student_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
