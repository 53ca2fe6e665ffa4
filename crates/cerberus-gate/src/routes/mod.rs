//! HTTP routes for the gate service.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub mod answer;
pub mod gate;
pub mod health;
pub mod origin;
pub mod statics;

/// Create the main application router.
///
/// The challenge endpoints live under the configured base path and are never
/// screened; everything else goes through the gate middleware on its way to
/// the origin.
pub fn create_router(state: AppState) -> Router {
    let base = state.settings.base_url.clone();

    let endpoints = Router::new()
        .route("/answer", post(answer::handle))
        .route("/static/{*path}", get(statics::serve));

    let gated = Router::new()
        .fallback(origin::serve)
        .layer(middleware::from_fn_with_state(state.clone(), gate::screen));

    Router::new()
        .route("/healthz", get(health::healthz))
        .nest(&base, endpoints)
        .merge(gated)
        .with_state(state)
}
