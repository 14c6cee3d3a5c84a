use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::app::services::AppServices;
use crate::app::errors;
use crate::context::CallerContext;

pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "store": services.backend(),
    }))
}

pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    match services.get_user(caller.user_id()).await {
        Ok(user) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "user_id": user.id.to_string(),
                "name": user.name,
                "email": user.email,
            })),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
