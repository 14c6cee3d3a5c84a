use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use splitledger_infra::RegisterUser;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn register_user(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RegisterUserRequest>,
) -> axum::response::Response {
    let cmd = RegisterUser {
        name: body.name,
        email: body.email,
    };

    match services.register_user(cmd).await {
        Ok(user) => (StatusCode::CREATED, Json(dto::user_to_json(&user))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
