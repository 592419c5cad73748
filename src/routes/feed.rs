use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Anonymous reading: drafts never appear here, not even by slug.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/feed", get(handlers::list_feed))
        .route("/feed/{slug}", get(handlers::get_feed_article))
}
