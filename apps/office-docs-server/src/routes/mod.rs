//! Route modules for Office Docs Server

pub mod health;
pub mod rpc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(rpc::router())
        .nest("/health", health::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
