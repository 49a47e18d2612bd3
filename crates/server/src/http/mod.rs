use axum::{Router, routing::get};

use crate::{AppState, routes};

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(routes::webhooks::router())
        .merge(routes::reviews::router())
        .merge(routes::dashboard::router());

    Router::new()
        .route("/", get(routes::health::service_info))
        .route("/health", get(routes::health::health_check))
        .nest("/api/v1", api_routes)
        .with_state(state)
}
