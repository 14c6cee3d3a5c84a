//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: storage backend selection
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use crate::identity::{Hs256IdentityProvider, IdentityProvider};
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router over the given services and identity provider.
pub fn build_app(services: AppServices, identity: Arc<dyn IdentityProvider>) -> Router {
    let services = Arc::new(services);
    let auth_state = middleware::AuthState {
        identity,
        services: services.clone(),
    };

    // Protected routes: require a bearer token naming a registered user.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .merge(routes::public_router())
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}

/// Router over a fresh in-memory ledger with HS256 bearer tokens.
pub fn build_in_memory_app(jwt_secret: impl AsRef<[u8]>) -> Router {
    build_app(
        AppServices::in_memory(),
        Arc::new(Hs256IdentityProvider::new(jwt_secret)),
    )
}
