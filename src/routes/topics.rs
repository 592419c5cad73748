use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Topics are created but never changed through the API, so `/topics/{id}`
/// only answers GET.
pub fn routes() -> Router<AppState> {
    Router::new()
        // GET /topics, POST /topics (staff)
        .route(
            "/topics",
            get(handlers::list_topics).post(handlers::create_topic),
        )
        // GET /topics/{id}
        .route("/topics/{id}", get(handlers::get_topic))
}
