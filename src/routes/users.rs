use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        // GET /users/{id}
        // Read-only profile. Every other verb answers 405.
        .route("/users/{id}", get(handlers::get_user))
        // POST /register
        // Self-service sign-up. New accounts are never staff.
        .route("/register", post(handlers::register_user))
}
