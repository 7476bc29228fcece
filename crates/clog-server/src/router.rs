use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all change log endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/events",
            post(handler::append_handler).get(handler::replay_handler),
        )
        .route("/events/:offset", get(handler::get_event_handler))
        .route("/subscriptions", post(handler::subscribe_handler))
        .route(
            "/subscriptions/:id",
            get(handler::read_handler).delete(handler::unsubscribe_handler),
        )
        .route("/subscriptions/:id/info", get(handler::cursor_info_handler))
        .route("/consumers", get(handler::consumers_handler))
        .route("/consumers/:id/ack", post(handler::ack_handler))
        .route("/consumers/:id/progress", get(handler::progress_handler))
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
