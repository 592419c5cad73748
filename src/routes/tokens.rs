use crate::{AppState, handlers};
use axum::{Router, routing::post};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/token", post(handlers::obtain_token))
        .route("/token/refresh", post(handlers::refresh_token))
}
