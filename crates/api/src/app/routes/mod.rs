use axum::{
    Router,
    routing::{get, post, put},
};

pub mod balances;
pub mod expenses;
pub mod system;
pub mod users;

/// Router for endpoints that need no caller identity.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/users", post(users::register_user))
}

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/expenses", get(expenses::list_expenses).post(expenses::create_expense))
        .route("/expenses/:id", put(expenses::update_expense))
        .route("/expenses/:id/settle", post(expenses::settle_expense))
        .route("/balances", get(balances::list_balances))
}
