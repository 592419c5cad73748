use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Core Entities (Mapped to Database) ---

/// User
///
/// An account that can author Articles. The password is only ever held as an
/// Argon2 PHC string, and this struct is deliberately not `Serialize`: the wire
/// representation lives in `serializers::UserRepresentation`.
#[derive(Debug, Clone, FromRow, Default)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    // The RBAC field. Staff users may publish articles, create topics and
    // modify any article.
    pub is_staff: bool,
    pub password_hash: String,
    pub date_joined: DateTime<Utc>,
}

/// Topic
///
/// A category label grouping Articles. Topics are created by staff and never
/// modified through the API.
#[derive(Debug, Clone, FromRow, Default, PartialEq)]
pub struct Topic {
    pub id: i64,
    pub title: String,
}

/// TopicSummary
///
/// A Topic joined with the number of Articles filed under it.
#[derive(Debug, Clone, FromRow, Default)]
pub struct TopicSummary {
    #[sqlx(flatten)]
    pub topic: Topic,
    pub articles_count: i64,
}

/// ArticleStatus
///
/// Lifecycle of an Article. The only transition exposed anywhere is
/// `Draft -> Published`, through the publish action.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "article_status", rename_all = "lowercase")]
#[ts(export)]
pub enum ArticleStatus {
    #[default]
    Draft,
    Published,
}

/// Article
///
/// The central entity. `user_id` is fixed at creation and `created` is set
/// exactly once by the store; `modified` moves on every mutation.
#[derive(Debug, Clone, FromRow, Default)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub slug: String,
    pub status: ArticleStatus,
    pub topic_id: i64,
    pub user_id: i64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Article {
    pub fn is_published(&self) -> bool {
        self.status == ArticleStatus::Published
    }
}

impl fmt::Display for Article {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

/// ArticleWithTopic
///
/// An Article joined with its Topic's display title, used where the topic is
/// rendered as plain text rather than a navigable reference.
#[derive(Debug, Clone, FromRow, Default)]
pub struct ArticleWithTopic {
    #[sqlx(flatten)]
    pub article: Article,
    pub topic_title: String,
}

// --- Write Models (Store Inputs) ---

/// NewUser
///
/// Everything the store needs to persist an account. `password_hash` must
/// already be hashed.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub password_hash: String,
}

/// ArticleDraft
///
/// The validated client payload for a new Article. It carries no owner: the
/// author is always passed separately from the authenticated actor.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleDraft {
    pub title: String,
    pub text: String,
    pub topic_id: i64,
}

/// ArticleChanges
///
/// A validated update. `None` leaves the column untouched. Status and owner are
/// not representable here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleChanges {
    pub title: Option<String>,
    pub text: Option<String>,
    pub topic_id: Option<i64>,
}

impl ArticleChanges {
    /// Applies the changes to an in-memory copy of an article.
    pub fn apply_to(&self, article: &mut Article) {
        if let Some(title) = &self.title {
            article.title = title.clone();
        }
        if let Some(text) = &self.text {
            article.text = text.clone();
        }
        if let Some(topic_id) = self.topic_id {
            article.topic_id = topic_id;
        }
    }
}

// --- Slugs ---

const SLUG_TIMESTAMP_FORMAT: &str = "%d%m%Y%H%M%S";
/// Width of the `articles.slug` column.
pub const SLUG_MAX_LENGTH: usize = 255;

/// Lowercases `text`, keeps ASCII alphanumerics and underscores, and joins the
/// remaining words with single hyphens.
pub fn slugify(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter_map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                Some(ch.to_ascii_lowercase())
            } else if ch.is_whitespace() || ch == '-' {
                Some(' ')
            } else {
                None
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .trim_matches(|c| c == '-' || c == '_')
        .to_string()
}

/// Candidate number `attempt` for the permanent slug of an article created at
/// `created`. Attempt 0 is the plain slug; later attempts append `-2`, `-3`,
/// ... after the timestamp, so two titles that slugify alike in the same
/// second both get a slug. The title part is cut short so the result always
/// fits [`SLUG_MAX_LENGTH`].
pub fn article_slug(title: &str, created: DateTime<Utc>, attempt: u32) -> String {
    let stamp = created.format(SLUG_TIMESTAMP_FORMAT).to_string();
    let suffix = match attempt {
        0 => stamp,
        n => format!("{stamp}-{}", n + 1),
    };

    // slugify output is ASCII, so byte truncation never splits a character.
    let mut base = slugify(title);
    base.truncate(SLUG_MAX_LENGTH.saturating_sub(suffix.len() + 1));
    let base = base.trim_end_matches(|c| c == '-' || c == '_');
    if base.is_empty() {
        suffix
    } else {
        format!("{base}-{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn slugify_collapses_separators_and_drops_punctuation() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust -- is   fun  "), "rust-is-fun");
        assert_eq!(slugify("snake_case stays"), "snake_case-stays");
        assert_eq!(slugify("Żółć café"), "caf");
        assert_eq!(slugify("__private__"), "private");
    }

    #[test]
    fn article_slug_appends_creation_instant() {
        let created = Utc.with_ymd_and_hms(2020, 3, 1, 19, 36, 5).unwrap();
        assert_eq!(
            article_slug("My First Post", created, 0),
            "my-first-post-01032020193605"
        );
        assert_eq!(article_slug("!!!", created, 0), "01032020193605");
    }

    #[test]
    fn article_slug_fits_the_column_for_the_longest_title() {
        let created = Utc.with_ymd_and_hms(2020, 3, 1, 19, 36, 5).unwrap();
        let slug = article_slug(&"a".repeat(255), created, 0);
        assert_eq!(slug.len(), SLUG_MAX_LENGTH);
        assert!(slug.ends_with("-01032020193605"));

        let variant = article_slug(&"a".repeat(255), created, 11);
        assert!(variant.len() <= SLUG_MAX_LENGTH);
        assert!(variant.ends_with("-01032020193605-12"));

        // A cut that lands on a separator does not leave a double hyphen.
        let title = format!("{} tail", "b".repeat(239));
        assert_eq!(
            article_slug(&title, created, 0),
            format!("{}-01032020193605", "b".repeat(239))
        );
    }

    #[test]
    fn article_slug_variants_are_distinct() {
        let created = Utc.with_ymd_and_hms(2020, 3, 1, 19, 36, 5).unwrap();
        assert_eq!(
            article_slug("Hello World", created, 0),
            "hello-world-01032020193605"
        );
        assert_eq!(
            article_slug("Hello, World!", created, 1),
            "hello-world-01032020193605-2"
        );
        assert_eq!(article_slug("!!!", created, 2), "01032020193605-3");
    }

    #[test]
    fn changes_only_touch_provided_fields() {
        let mut article = Article {
            title: "old".into(),
            text: "body".into(),
            topic_id: 1,
            ..Article::default()
        };
        ArticleChanges {
            title: Some("new".into()),
            ..ArticleChanges::default()
        }
        .apply_to(&mut article);

        assert_eq!(article.title, "new");
        assert_eq!(article.text, "body");
        assert_eq!(article.topic_id, 1);
    }
}
