use axum::{
    Json,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::{
    permissions::Denial,
    repository::{RepoError, UniqueField},
    serializers,
};

pub const NOT_AUTHENTICATED: &str = "Authentication credentials were not provided.";
pub const PERMISSION_DENIED: &str = "You do not have permission to perform this action.";
pub const NOT_FOUND: &str = "Not found.";
pub const INVALID_CREDENTIALS: &str = "No active account found with the given credentials";
pub const TOKEN_INVALID_OR_EXPIRED: &str = "Token is invalid or expired";
pub const TOKEN_NOT_VALID_FOR_ANY_TYPE: &str = "Given token not valid for any token type";
pub const USER_NOT_FOUND: &str = "User not found";

/// ErrorDetail
///
/// Body of every non-validation failure.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetail {
    pub detail: String,
    /// Stable machine-readable code, present on token failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub code: Option<&'static str>,
}

/// ValidationErrors
///
/// Field name -> list of messages. Serialized as a plain JSON object whose keys
/// come out in a deterministic (sorted) order.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(())` when nothing was recorded, the collected errors otherwise.
    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

/// ApiError
///
/// The single failure type of every controller. Each variant maps to exactly
/// one HTTP status.
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationErrors),
    /// The body could not be decoded as JSON.
    Parse(String),
    NotAuthenticated,
    InvalidCredentials,
    /// A bearer or refresh token failed verification.
    TokenNotValid(&'static str),
    /// A valid access token whose user no longer exists.
    UserNotFound,
    PermissionDenied,
    NotFound,
    MethodNotAllowed(Method),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Parse(_) => StatusCode::BAD_REQUEST,
            ApiError::NotAuthenticated
            | ApiError::InvalidCredentials
            | ApiError::TokenNotValid(_)
            | ApiError::UserNotFound => StatusCode::UNAUTHORIZED,
            ApiError::PermissionDenied => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(self) -> ErrorDetail {
        let (detail, code) = match self {
            ApiError::Parse(msg) => (msg, None),
            ApiError::NotAuthenticated => (NOT_AUTHENTICATED.to_string(), None),
            ApiError::InvalidCredentials => (INVALID_CREDENTIALS.to_string(), None),
            ApiError::TokenNotValid(msg) => (msg.to_string(), Some("token_not_valid")),
            ApiError::UserNotFound => (USER_NOT_FOUND.to_string(), Some("user_not_found")),
            ApiError::PermissionDenied => (PERMISSION_DENIED.to_string(), None),
            ApiError::NotFound => (NOT_FOUND.to_string(), None),
            ApiError::MethodNotAllowed(method) => {
                (format!("Method \"{}\" not allowed.", method), None)
            }
            ApiError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                ("A server error occurred.".to_string(), None)
            }
            // Rendered as a field map in `into_response`.
            ApiError::Validation(_) => (String::new(), None),
        };
        ErrorDetail { detail, code }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let ApiError::Validation(errors) = self {
            return (status, Json(errors)).into_response();
        }

        let challenge = status == StatusCode::UNAUTHORIZED;
        let mut response = (status, Json(self.detail())).into_response();
        if challenge {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"api\""),
            );
        }
        response
    }
}

impl From<Denial> for ApiError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::NotAuthenticated => ApiError::NotAuthenticated,
            Denial::Forbidden => ApiError::PermissionDenied,
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => ApiError::NotFound,
            // A uniqueness race lost at the store reads exactly like the
            // validator's own answer.
            RepoError::Conflict(field) => {
                let (name, message) = unique_violation(field);
                ApiError::Validation(ValidationErrors::single(name, message))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

fn unique_violation(field: UniqueField) -> (&'static str, &'static str) {
    match field {
        UniqueField::TopicTitle => ("title", serializers::TOPIC_TITLE_TAKEN),
        UniqueField::ArticleSlug => ("slug", serializers::ARTICLE_SLUG_TAKEN),
        UniqueField::Username => ("username", serializers::USERNAME_TAKEN),
        UniqueField::Email => ("email", serializers::EMAIL_TAKEN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_group_messages_per_field() {
        let mut errors = ValidationErrors::new();
        errors.add("title", "first");
        errors.add("text", "second");
        errors.add("title", "third");

        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "text": ["second"], "title": ["first", "third"] })
        );
    }

    #[test]
    fn denials_map_to_distinct_statuses() {
        assert_eq!(
            ApiError::from(Denial::NotAuthenticated).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(Denial::Forbidden).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn store_conflicts_become_field_errors() {
        match ApiError::from(RepoError::Conflict(UniqueField::TopicTitle)) {
            ApiError::Validation(errors) => assert_eq!(
                errors.get("title"),
                Some(&[serializers::TOPIC_TITLE_TAKEN.to_string()][..])
            ),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unauthorized_responses_carry_a_challenge() {
        let response = ApiError::NotAuthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }
}
