use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use splitledger_core::DomainError;
use splitledger_infra::{LedgerError, StoreError};

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    match err {
        LedgerError::Domain(e) => domain_error_to_response(e),
        LedgerError::Store(e) => store_error_to_response(e),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::PolicyViolation(msg) => json_error(StatusCode::BAD_REQUEST, "policy_violation", msg),
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DomainError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        DomainError::Unauthorized => json_error(StatusCode::UNAUTHORIZED, "unauthorized", "unauthorized"),
        DomainError::AlreadySettled => {
            json_error(StatusCode::CONFLICT, "already_settled", "expense split is already settled")
        }
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
    }
}

fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        other => {
            error!(error = %other, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", other.to_string())
        }
    }
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
