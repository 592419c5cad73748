//! Router Module Index
//!
//! One module per resource. Access control is not applied at this level:
//! anonymous and authenticated callers reach the same handlers, and each
//! handler asks `permissions::decide` with the resolved `Actor`.

/// `/users/{id}` and `/register`.
pub mod users;

/// `/topics` and `/topics/{id}`.
pub mod topics;

/// `/articles`, `/articles/{id}` and the publish action.
pub mod articles;

/// `/token` and `/token/refresh`.
pub mod tokens;

/// The published-only feed.
pub mod feed;
