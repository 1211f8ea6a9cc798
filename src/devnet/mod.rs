//! Local development ledger served over JSON-RPC.
//!
//! Exposes any [`LedgerService`] (normally a [`crate::ledger::MemoryLedger`])
//! with the same methods [`crate::ledger::RpcClient`] calls, so the CLI and the
//! client can be exercised end to end without a real node.

mod handlers;
mod middleware;

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::ledger::LedgerService;

pub use middleware::AuthConfig;

pub fn create_router(ledger: Arc<dyn LedgerService>, auth: AuthConfig) -> Router {
    Router::new()
        .route("/", post(handlers::rpc))
        .route_layer(from_fn_with_state(auth, middleware::auth_middleware))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(ledger)
}
