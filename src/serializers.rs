//! Representation builder: every wire shape the API reads or writes, and the
//! field validation applied on the way in.
//!
//! Inputs are deliberately loose (`Option<serde_json::Value>` per field) so a
//! wrong type or a missing key becomes a per-field message instead of a parse
//! failure. Validators collect every field's errors before failing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;
use utoipa::ToSchema;
use validator::ValidateEmail;

use crate::{
    error::{ApiError, ValidationErrors},
    links::Links,
    models::{
        Article, ArticleChanges, ArticleDraft, ArticleStatus, ArticleWithTopic, NewUser, Topic,
        TopicSummary, User,
    },
    repository::Repository,
};

// --- Messages ---

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";
pub const NULL: &str = "This field may not be null.";
pub const NOT_A_STRING: &str = "Not a valid string.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";
pub const INVALID_USERNAME: &str = "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.";
pub const NO_URL_MATCH: &str = "Invalid hyperlink - No URL match.";
pub const OBJECT_DOES_NOT_EXIST: &str = "Invalid hyperlink - Object does not exist.";

pub const ARTICLE_TITLE_TAKEN: &str = "Article with given title already exists!";
pub const ARTICLE_SLUG_TAKEN: &str = "article with this slug already exists.";
pub const TOPIC_TITLE_TAKEN: &str = "Topic with given title already exists!";
pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const EMAIL_TAKEN: &str = "user with this email already exists.";

const TITLE_MAX_LENGTH: usize = 255;
const NAME_MAX_LENGTH: usize = 255;
const USERNAME_MAX_LENGTH: usize = 150;
const EMAIL_MAX_LENGTH: usize = 254;

/// `YYYY-DD-MM HH:MM`. Day before month is the established wire format and
/// clients parse it as such.
pub const CREATED_FORMAT: &str = "%Y-%d-%m %H:%M";

pub fn max_length(limit: usize) -> String {
    format!("Ensure this field has no more than {limit} characters.")
}

pub fn incorrect_type(value: &Value) -> String {
    format!(
        "Incorrect type. Expected URL string, received {}.",
        json_type_name(value)
    )
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

pub fn format_created(created: DateTime<Utc>) -> String {
    created.format(CREATED_FORMAT).to_string()
}

// --- Field rules ---

#[derive(Clone, Copy)]
struct CharRules {
    required: bool,
    max_length: Option<usize>,
    trim: bool,
}

impl CharRules {
    fn required() -> Self {
        Self {
            required: true,
            max_length: None,
            trim: true,
        }
    }

    fn optional() -> Self {
        Self {
            required: false,
            ..Self::required()
        }
    }

    fn max(self, limit: usize) -> Self {
        Self {
            max_length: Some(limit),
            ..self
        }
    }

    fn untrimmed(self) -> Self {
        Self { trim: false, ..self }
    }
}

/// Reads a string field. Numbers are accepted and stringified; any other
/// non-string is rejected. Returns `None` (after recording an error where
/// appropriate) when there is no usable value.
fn char_field(
    errors: &mut ValidationErrors,
    name: &str,
    value: Option<&Value>,
    rules: CharRules,
) -> Option<String> {
    let raw = match value {
        None => {
            if rules.required {
                errors.add(name, REQUIRED);
            }
            return None;
        }
        Some(Value::Null) => {
            errors.add(name, NULL);
            return None;
        }
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => {
            errors.add(name, NOT_A_STRING);
            return None;
        }
    };

    let text = if rules.trim {
        raw.trim().to_string()
    } else {
        raw
    };

    if text.is_empty() {
        errors.add(name, BLANK);
        return None;
    }
    if let Some(limit) = rules.max_length {
        if text.chars().count() > limit {
            errors.add(name, max_length(limit));
            return None;
        }
    }
    Some(text)
}

/// Resolves the `topic` reference of an article payload to an existing topic id.
async fn topic_field(
    errors: &mut ValidationErrors,
    repo: &dyn Repository,
    links: &Links,
    value: Option<&Value>,
    required: bool,
) -> Result<Option<i64>, ApiError> {
    let reference = match value {
        None => {
            if required {
                errors.add("topic", REQUIRED);
            }
            return Ok(None);
        }
        Some(Value::Null) => {
            errors.add("topic", NULL);
            return Ok(None);
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors.add("topic", NULL);
            return Ok(None);
        }
        Some(Value::String(s)) => s,
        Some(other) => {
            errors.add("topic", incorrect_type(other));
            return Ok(None);
        }
    };

    let Ok(topic_id) = links.resolve_topic(reference) else {
        errors.add("topic", NO_URL_MATCH);
        return Ok(None);
    };

    if repo.get_topic(topic_id).await?.is_none() {
        errors.add("topic", OBJECT_DOES_NOT_EXIST);
        return Ok(None);
    }
    Ok(Some(topic_id))
}

fn valid_username(username: &str) -> bool {
    username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '@' | '.' | '+' | '-'))
}

// --- Inputs ---

/// Keeps an explicit `null` as `Some(Value::Null)`; plain `Option` would fold
/// it into "missing".
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// ArticleInput
///
/// Writable article fields. `status` and `user` are not fields at all: a client
/// that sends them has them ignored.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ArticleInput {
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub title: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub text: Option<Value>,
    /// Navigable reference to the topic, e.g. `http://host/topics/1`.
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub topic: Option<Value>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TopicInput {
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub title: Option<Value>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub username: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub password: Option<Value>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RefreshRequest {
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub refresh: Option<Value>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub username: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub email: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub first_name: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub last_name: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub password: Option<Value>,
}

/// Registration
///
/// A validated sign-up. The password is still plaintext here and must be hashed
/// before it reaches the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

impl Registration {
    pub fn into_new_user(self, password_hash: String) -> NewUser {
        NewUser {
            username: self.username,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            is_staff: false,
            password_hash,
        }
    }
}

// --- Validators ---

async fn article_title_unique(
    errors: &mut ValidationErrors,
    repo: &dyn Repository,
    title: Option<&String>,
    except: Option<i64>,
) -> Result<(), ApiError> {
    if let Some(title) = title {
        if repo.article_title_taken(title, except).await? {
            errors.add("title", ARTICLE_TITLE_TAKEN);
        }
    }
    Ok(())
}

/// validate_article_create
///
/// All three fields are required. The returned draft has no owner; the caller
/// supplies the actor separately.
pub async fn validate_article_create(
    repo: &dyn Repository,
    links: &Links,
    input: ArticleInput,
) -> Result<ArticleDraft, ApiError> {
    let mut errors = ValidationErrors::new();

    let title = char_field(
        &mut errors,
        "title",
        input.title.as_ref(),
        CharRules::required().max(TITLE_MAX_LENGTH),
    );
    article_title_unique(&mut errors, repo, title.as_ref(), None).await?;
    let text = char_field(&mut errors, "text", input.text.as_ref(), CharRules::required());
    let topic_id = topic_field(&mut errors, repo, links, input.topic.as_ref(), true).await?;

    errors.into_result()?;
    match (title, text, topic_id) {
        (Some(title), Some(text), Some(topic_id)) => Ok(ArticleDraft {
            title,
            text,
            topic_id,
        }),
        _ => Err(ApiError::Internal(
            "article validation passed with missing fields".into(),
        )),
    }
}

/// validate_article_update
///
/// `partial = false` (PUT) requires every writable field; `partial = true`
/// (PATCH) validates only what was sent. The article's own title never counts
/// as a duplicate of itself.
pub async fn validate_article_update(
    repo: &dyn Repository,
    links: &Links,
    article_id: i64,
    input: ArticleInput,
    partial: bool,
) -> Result<ArticleChanges, ApiError> {
    let mut errors = ValidationErrors::new();
    let rules = if partial {
        CharRules::optional()
    } else {
        CharRules::required()
    };

    let title = char_field(
        &mut errors,
        "title",
        input.title.as_ref(),
        rules.max(TITLE_MAX_LENGTH),
    );
    article_title_unique(&mut errors, repo, title.as_ref(), Some(article_id)).await?;
    let text = char_field(&mut errors, "text", input.text.as_ref(), rules);
    let topic_id = topic_field(&mut errors, repo, links, input.topic.as_ref(), !partial).await?;

    errors.into_result()?;
    Ok(ArticleChanges {
        title,
        text,
        topic_id,
    })
}

/// Validates a new topic's title, including that no topic already has it.
pub async fn validate_topic(repo: &dyn Repository, input: TopicInput) -> Result<String, ApiError> {
    let mut errors = ValidationErrors::new();
    let title = char_field(
        &mut errors,
        "title",
        input.title.as_ref(),
        CharRules::required().max(TITLE_MAX_LENGTH),
    );

    if let Some(title) = &title {
        if repo.topic_title_taken(title).await? {
            errors.add("title", TOPIC_TITLE_TAKEN);
        }
    }

    errors.into_result()?;
    title.ok_or_else(|| ApiError::Internal("topic validation passed without a title".into()))
}

/// Returns `(username, password)`. The password is taken verbatim.
pub fn validate_token_request(input: TokenRequest) -> Result<(String, String), ApiError> {
    let mut errors = ValidationErrors::new();
    let username = char_field(
        &mut errors,
        "username",
        input.username.as_ref(),
        CharRules::required(),
    );
    let password = char_field(
        &mut errors,
        "password",
        input.password.as_ref(),
        CharRules::required().untrimmed(),
    );

    errors.into_result()?;
    username.zip(password).ok_or_else(|| {
        ApiError::Internal("token request validation passed with missing fields".into())
    })
}

pub fn validate_refresh_request(input: RefreshRequest) -> Result<String, ApiError> {
    let mut errors = ValidationErrors::new();
    let refresh = char_field(
        &mut errors,
        "refresh",
        input.refresh.as_ref(),
        CharRules::required(),
    );
    errors.into_result()?;
    refresh.ok_or_else(|| ApiError::Internal("refresh validation passed without a token".into()))
}

pub async fn validate_register(
    repo: &dyn Repository,
    input: RegisterRequest,
) -> Result<Registration, ApiError> {
    let mut errors = ValidationErrors::new();

    let username = char_field(
        &mut errors,
        "username",
        input.username.as_ref(),
        CharRules::required().max(USERNAME_MAX_LENGTH),
    );
    if let Some(username) = &username {
        if !valid_username(username) {
            errors.add("username", INVALID_USERNAME);
        } else if repo.find_user_by_username(username).await?.is_some() {
            errors.add("username", USERNAME_TAKEN);
        }
    }

    let email = char_field(
        &mut errors,
        "email",
        input.email.as_ref(),
        CharRules::required().max(EMAIL_MAX_LENGTH),
    );
    if let Some(email) = &email {
        if !email.validate_email() {
            errors.add("email", INVALID_EMAIL);
        } else if repo.email_taken(email).await? {
            errors.add("email", EMAIL_TAKEN);
        }
    }

    let first_name = char_field(
        &mut errors,
        "first_name",
        input.first_name.as_ref(),
        CharRules::required().max(NAME_MAX_LENGTH),
    );
    let last_name = char_field(
        &mut errors,
        "last_name",
        input.last_name.as_ref(),
        CharRules::required().max(NAME_MAX_LENGTH),
    );
    let password = char_field(
        &mut errors,
        "password",
        input.password.as_ref(),
        CharRules::required().untrimmed(),
    );

    errors.into_result()?;
    match (username, email, first_name, last_name, password) {
        (Some(username), Some(email), Some(first_name), Some(last_name), Some(password)) => {
            Ok(Registration {
                username,
                email,
                first_name,
                last_name,
                password,
            })
        }
        _ => Err(ApiError::Internal(
            "registration validation passed with missing fields".into(),
        )),
    }
}

// --- Representations ---

/// UserPost
///
/// An article as listed on its author's profile; the topic is plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct UserPost {
    pub title: String,
    pub text: String,
    pub topic: String,
}

/// UserRepresentation
///
/// Public profile. Never carries the password hash or the staff flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct UserRepresentation {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub post_count: i64,
    pub posts: Vec<UserPost>,
}

impl UserRepresentation {
    pub fn build(user: &User, articles: &[ArticleWithTopic]) -> Self {
        let posts: Vec<UserPost> = articles
            .iter()
            .map(|row| UserPost {
                title: row.article.title.clone(),
                text: row.article.text.clone(),
                topic: row.topic_title.clone(),
            })
            .collect();
        Self {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            post_count: posts.len() as i64,
            posts,
        }
    }
}

/// ArticleRepresentation
///
/// The full article. `topic` and `user` are navigable references; `created`
/// uses [`CREATED_FORMAT`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct ArticleRepresentation {
    pub title: String,
    pub text: String,
    pub topic: String,
    pub status: ArticleStatus,
    pub user: String,
    pub created: String,
}

impl ArticleRepresentation {
    pub fn build(article: &Article, links: &Links) -> Self {
        Self {
            title: article.title.clone(),
            text: article.text.clone(),
            topic: links.topic(article.topic_id),
            status: article.status,
            user: links.user(article.user_id),
            created: format_created(article.created),
        }
    }
}

/// PublishedArticle
///
/// Feed entry for anonymous readers. Carries the slug that addresses it in
/// `/feed/{slug}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct PublishedArticle {
    pub title: String,
    pub text: String,
    pub slug: String,
    pub topic: String,
    pub user: String,
    pub created: String,
}

impl PublishedArticle {
    pub fn build(article: &Article, links: &Links) -> Self {
        Self {
            title: article.title.clone(),
            text: article.text.clone(),
            slug: article.slug.clone(),
            topic: links.topic(article.topic_id),
            user: links.user(article.user_id),
            created: format_created(article.created),
        }
    }
}

/// Reduced article projection embedded in a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct TopicArticle {
    pub title: String,
    pub text: String,
    pub status: ArticleStatus,
}

impl From<&Article> for TopicArticle {
    fn from(article: &Article) -> Self {
        Self {
            title: article.title.clone(),
            text: article.text.clone(),
            status: article.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct TopicListItem {
    pub title: String,
    pub url: String,
    pub articles_count: i64,
}

impl TopicListItem {
    pub fn build(summary: &TopicSummary, links: &Links) -> Self {
        Self {
            title: summary.topic.title.clone(),
            url: links.topic(summary.topic.id),
            articles_count: summary.articles_count,
        }
    }

    /// A topic that has just been created and has no articles yet.
    pub fn fresh(topic: &Topic, links: &Links) -> Self {
        Self {
            title: topic.title.clone(),
            url: links.topic(topic.id),
            articles_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct TopicDetail {
    pub title: String,
    pub url: String,
    pub articles_count: i64,
    pub articles: Vec<TopicArticle>,
}

impl TopicDetail {
    pub fn build(topic: &Topic, articles: &[Article], links: &Links) -> Self {
        Self {
            title: topic.title.clone(),
            url: links.topic(topic.id),
            articles_count: articles.len() as i64,
            articles: articles.iter().map(TopicArticle::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct TokenPair {
    pub refresh: String,
    pub access: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct AccessToken {
    pub access: String,
}

/// A one-line confirmation, e.g. after publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct Detail {
    pub detail: String,
}

impl Detail {
    pub fn published(article: &Article) -> Self {
        Self {
            detail: format!("Article '{}' has been successfully published!", article),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn created_puts_the_day_before_the_month() {
        // 1 March 2020: the day (01) comes before the month (03).
        let created = Utc.with_ymd_and_hms(2020, 3, 1, 19, 36, 5).unwrap();
        assert_eq!(format_created(created), "2020-01-03 19:36");
    }

    #[test]
    fn char_field_reports_each_failure_mode() {
        let mut errors = ValidationErrors::new();
        let rules = CharRules::required().max(5);

        assert_eq!(char_field(&mut errors, "a", None, rules), None);
        assert_eq!(char_field(&mut errors, "b", Some(&json!("   ")), rules), None);
        assert_eq!(char_field(&mut errors, "c", Some(&json!(null)), rules), None);
        assert_eq!(char_field(&mut errors, "d", Some(&json!(["x"])), rules), None);
        assert_eq!(char_field(&mut errors, "e", Some(&json!("toolong")), rules), None);
        assert_eq!(char_field(&mut errors, "f", Some(&json!(42)), rules), Some("42".into()));
        assert_eq!(char_field(&mut errors, "g", Some(&json!(" ok ")), rules), Some("ok".into()));

        assert_eq!(errors.get("a"), Some(&[REQUIRED.to_string()][..]));
        assert_eq!(errors.get("b"), Some(&[BLANK.to_string()][..]));
        assert_eq!(errors.get("c"), Some(&[NULL.to_string()][..]));
        assert_eq!(errors.get("d"), Some(&[NOT_A_STRING.to_string()][..]));
        assert_eq!(errors.get("e"), Some(&[max_length(5)][..]));
        assert!(!errors.has("f"));
        assert!(!errors.has("g"));
    }

    #[test]
    fn explicit_null_is_not_the_same_as_missing() {
        let input: TopicInput = serde_json::from_value(json!({ "title": null })).unwrap();
        assert_eq!(input.title, Some(Value::Null));
        let input: TopicInput = serde_json::from_value(json!({})).unwrap();
        assert_eq!(input.title, None);
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let mut errors = ValidationErrors::new();
        assert_eq!(char_field(&mut errors, "a", None, CharRules::optional()), None);
        assert!(errors.is_empty());
    }

    #[test]
    fn incorrect_type_names_the_received_kind() {
        assert_eq!(
            incorrect_type(&json!(1)),
            "Incorrect type. Expected URL string, received int."
        );
        assert_eq!(
            incorrect_type(&json!({"id": 1})),
            "Incorrect type. Expected URL string, received dict."
        );
    }

    #[test]
    fn email_and_username_shapes() {
        assert!("someone@example.com".validate_email());
        assert!(!"not an email".validate_email());
        assert!(!"@example.com".validate_email());
        assert!(!"a<b>@x.com".validate_email());
        assert!(valid_username("jane.doe+blog@x"));
        assert!(!valid_username("jane doe"));
    }

    #[test]
    fn user_representation_counts_posts() {
        let user = User {
            id: 1,
            username: "jsmith".into(),
            first_name: "John".into(),
            last_name: "Smith".into(),
            email: "js@example.com".into(),
            ..User::default()
        };
        let rows = vec![ArticleWithTopic {
            article: Article {
                title: "T".into(),
                text: "body".into(),
                ..Article::default()
            },
            topic_title: "Rust".into(),
        }];

        let json = serde_json::to_value(UserRepresentation::build(&user, &rows)).unwrap();
        assert_eq!(
            json,
            json!({
                "first_name": "John",
                "last_name": "Smith",
                "username": "jsmith",
                "email": "js@example.com",
                "post_count": 1,
                "posts": [{ "title": "T", "text": "body", "topic": "Rust" }]
            })
        );
    }

    #[test]
    fn publish_confirmation_embeds_the_title() {
        let article = Article {
            title: "Hello".into(),
            ..Article::default()
        };
        assert_eq!(
            Detail::published(&article).detail,
            "Article 'Hello' has been successfully published!"
        );
    }
}
