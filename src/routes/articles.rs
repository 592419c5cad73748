use crate::{AppState, handlers};
use axum::{Router, routing::get};

pub fn routes() -> Router<AppState> {
    Router::new()
        // GET /articles?search=..., POST /articles (authenticated)
        .route(
            "/articles",
            get(handlers::list_articles).post(handlers::create_article),
        )
        // Mutations require the owner or staff; the handlers resolve the
        // article first so a missing id is a 404 for everyone.
        .route(
            "/articles/{id}",
            get(handlers::get_article)
                .put(handlers::replace_article)
                .patch(handlers::partial_update_article)
                .delete(handlers::delete_article),
        )
        // GET /articles/{id}/publish (staff)
        .route("/articles/{id}/publish", get(handlers::publish_article))
}
