use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use splitledger_core::ExpenseId;
use splitledger_infra::{CreateExpense, UpdateExpense};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::CallerContext;

pub async fn create_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<dto::ExpenseRequest>,
) -> axum::response::Response {
    let input = match body.into_input() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let cmd = CreateExpense {
        created_by: caller.user_id(),
        description: input.description,
        currency: input.currency,
        amount: input.amount,
        policy: input.policy,
        shares: input.shares,
        occurred_at: Utc::now(),
    };

    match services.create_expense(cmd).await {
        Ok(expense) => (StatusCode::CREATED, Json(dto::expense_to_json(&expense))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn update_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ExpenseRequest>,
) -> axum::response::Response {
    let expense_id: ExpenseId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let input = match body.into_input() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let cmd = UpdateExpense {
        expense_id,
        requested_by: caller.user_id(),
        description: input.description,
        currency: input.currency,
        amount: input.amount,
        policy: input.policy,
        shares: input.shares,
    };

    match services.update_expense(cmd).await {
        Ok(expense) => (StatusCode::OK, Json(dto::expense_to_json(&expense))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn settle_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let expense_id: ExpenseId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.settle_expense(expense_id, caller.user_id()).await {
        Ok(split) => (StatusCode::OK, Json(dto::split_to_json(&split))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_expenses(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    match services.user_expenses(caller.user_id()).await {
        Ok(expenses) => {
            let items = expenses.iter().map(dto::expense_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}
