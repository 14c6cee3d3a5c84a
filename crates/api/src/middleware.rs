use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use splitledger_core::DomainError;
use splitledger_infra::LedgerError;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::CallerContext;
use crate::identity::IdentityProvider;

#[derive(Clone)]
pub struct AuthState {
    pub identity: Arc<dyn IdentityProvider>,
    pub services: Arc<AppServices>,
}

/// Resolve the bearer token to a registered user and attach a [`CallerContext`].
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers()).ok_or_else(unauthorized)?;

    let user_id = state.identity.resolve(token).map_err(|e| {
        debug!(error = %e, "bearer token rejected");
        unauthorized()
    })?;

    match state.services.get_user(user_id).await {
        Ok(_) => {}
        Err(LedgerError::Domain(DomainError::NotFound(_))) => {
            debug!(user_id = %user_id, "token subject is not a registered user");
            return Err(unauthorized());
        }
        Err(e) => return Err(errors::ledger_error_to_response(e)),
    }

    req.extensions_mut().insert(CallerContext::new(user_id));

    Ok(next.run(req).await)
}

fn unauthorized() -> Response {
    errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", "missing or invalid bearer token")
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}
