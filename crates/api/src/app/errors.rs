use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use schoolerp_infra::InvoicingError;
use schoolerp_infra::command_dispatcher::DispatchError;
use schoolerp_infra::external::ExternalError;

pub fn invoicing_error_to_response(err: InvoicingError) -> axum::response::Response {
    match err {
        InvoicingError::Dispatch(e) => dispatch_error_to_response(e),
        InvoicingError::External(e) => external_error_to_response(e),
        e @ (InvoicingError::UnknownStudent(_)
        | InvoicingError::UnknownTemplate(_)
        | InvoicingError::UnknownInvoice(_)) => {
            json_error(StatusCode::NOT_FOUND, "not_found", e.to_string())
        }
    }
}

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
        DispatchError::TenantIsolation(msg) => {
            json_error(StatusCode::FORBIDDEN, "tenant_isolation", msg)
        }
    }
}

fn external_error_to_response(err: ExternalError) -> axum::response::Response {
    let code = match &err {
        ExternalError::MissingTemplate(_) => "missing_mail_template",
        ExternalError::MissingReport(_) => "missing_report",
        ExternalError::MissingRecipient(_) => "missing_recipient",
        ExternalError::Render(_) => "render_error",
        ExternalError::Attachment(_) => "attachment_error",
        ExternalError::Delivery(_) => "delivery_error",
        ExternalError::Sequence(_) => "sequence_error",
    };
    json_error(StatusCode::BAD_GATEWAY, code, err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path or body id, answering 400 `invalid_id` on failure.
pub fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, axum::response::Response> {
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}
