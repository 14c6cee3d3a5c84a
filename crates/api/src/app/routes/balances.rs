use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::CallerContext;

pub async fn list_balances(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    match services.user_balances(caller.user_id()).await {
        Ok(balances) => {
            let items = balances.iter().map(dto::balance_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}
