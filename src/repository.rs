use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, query_builder::QueryBuilder};
use std::sync::Arc;

use crate::{
    models::{
        Article, ArticleChanges, ArticleDraft, ArticleStatus, ArticleWithTopic, NewUser, Topic,
        TopicSummary, User, article_slug,
    },
    query::ArticleQuery,
};

/// Columns that carry a uniqueness guarantee in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    TopicTitle,
    ArticleSlug,
    Username,
    Email,
}

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("entity not found")]
    NotFound,
    #[error("unique constraint violated: {0:?}")]
    Conflict(UniqueField),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// How many slug candidates `create_article` tries before reporting a
/// conflict. See [`article_slug`].
pub const MAX_SLUG_ATTEMPTS: u32 = 16;

/// Repository Trait
///
/// The Entity Store contract. Controllers only ever see this trait, so the
/// Postgres implementation and the in-memory one are interchangeable.
///
/// Lookups return `Option` and leave the 404 decision to the caller; mutations
/// of a missing row return `RepoError::NotFound`. Every single-row write is
/// atomic.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: i64) -> RepoResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    async fn email_taken(&self, email: &str) -> RepoResult<bool>;
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;

    // --- Topics ---
    // Every topic with its article count, in primary-key order.
    async fn list_topics(&self) -> RepoResult<Vec<TopicSummary>>;
    async fn get_topic(&self, id: i64) -> RepoResult<Option<Topic>>;
    async fn topic_title_taken(&self, title: &str) -> RepoResult<bool>;
    // Fails with `Conflict(TopicTitle)` if the title already exists.
    async fn create_topic(&self, title: String) -> RepoResult<Topic>;

    // --- Articles ---
    async fn list_articles(&self, query: &ArticleQuery) -> RepoResult<Vec<Article>>;
    async fn get_article(&self, id: i64) -> RepoResult<Option<Article>>;
    async fn get_article_by_slug(&self, slug: &str) -> RepoResult<Option<Article>>;
    // Exact, case-sensitive match. `except` excludes one article (itself, on update).
    async fn article_title_taken(&self, title: &str, except: Option<i64>) -> RepoResult<bool>;
    async fn articles_for_topic(&self, topic_id: i64) -> RepoResult<Vec<Article>>;
    async fn articles_for_user(&self, user_id: i64) -> RepoResult<Vec<ArticleWithTopic>>;
    // Owner is a separate argument; the draft cannot name one.
    async fn create_article(&self, author_id: i64, draft: ArticleDraft) -> RepoResult<Article>;
    async fn update_article(&self, id: i64, changes: ArticleChanges) -> RepoResult<Article>;
    // Idempotent `draft -> published`.
    async fn publish_article(&self, id: i64) -> RepoResult<Article>;
    async fn delete_article(&self, id: i64) -> RepoResult<()>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The `Repository` backed by PostgreSQL (schema in `migrations/`).
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, is_staff, password_hash, date_joined";
const ARTICLE_COLUMNS: &str = "id, title, text, slug, status, topic_id, user_id, created, modified";

/// Maps unique-constraint violations onto the field they protect.
fn map_unique(err: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some("topics_title_key") => Some(UniqueField::TopicTitle),
                Some("articles_slug_key") => Some(UniqueField::ArticleSlug),
                Some("users_username_key") => Some(UniqueField::Username),
                Some("users_email_key") => Some(UniqueField::Email),
                _ => None,
            };
            if let Some(field) = field {
                return RepoError::Conflict(field);
            }
        }
    }
    tracing::error!("database error: {:?}", err);
    RepoError::Database(err)
}

fn logged(context: &'static str) -> impl Fn(sqlx::Error) -> RepoError {
    move |err| {
        tracing::error!("{} error: {:?}", context, err);
        RepoError::Database(err)
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: i64) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(logged("get_user"))
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(logged("find_user_by_username"))
    }

    async fn email_taken(&self, email: &str) -> RepoResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(logged("email_taken"))
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"INSERT INTO users (username, email, first_name, last_name, is_staff, password_hash, date_joined)
               VALUES ($1, $2, $3, $4, $5, $6, NOW())
               RETURNING {USER_COLUMNS}"#
        ))
        .bind(user.username)
        .bind(user.email)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.is_staff)
        .bind(user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique)
    }

    /// list_topics
    ///
    /// One grouped query instead of a count per topic.
    async fn list_topics(&self) -> RepoResult<Vec<TopicSummary>> {
        sqlx::query_as::<_, TopicSummary>(
            r#"
            SELECT t.id, t.title, COUNT(a.id) AS articles_count
            FROM topics t
            LEFT JOIN articles a ON a.topic_id = t.id
            GROUP BY t.id, t.title
            ORDER BY t.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(logged("list_topics"))
    }

    async fn get_topic(&self, id: i64) -> RepoResult<Option<Topic>> {
        sqlx::query_as::<_, Topic>("SELECT id, title FROM topics WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(logged("get_topic"))
    }

    async fn topic_title_taken(&self, title: &str) -> RepoResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM topics WHERE title = $1)")
            .bind(title)
            .fetch_one(&self.pool)
            .await
            .map_err(logged("topic_title_taken"))
    }

    async fn create_topic(&self, title: String) -> RepoResult<Topic> {
        sqlx::query_as::<_, Topic>("INSERT INTO topics (title) VALUES ($1) RETURNING id, title")
            .bind(title)
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique)
    }

    /// list_articles
    ///
    /// Builds the search filter with `QueryBuilder` so the term is always bound,
    /// never interpolated.
    async fn list_articles(&self, query: &ArticleQuery) -> RepoResult<Vec<Article>> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {ARTICLE_COLUMNS} FROM articles"));

        if let Some(pattern) = query.like_pattern() {
            builder.push(" WHERE (title ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR text ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }

        builder.push(" ORDER BY id");

        builder
            .build_query_as::<Article>()
            .fetch_all(&self.pool)
            .await
            .map_err(logged("list_articles"))
    }

    async fn get_article(&self, id: i64) -> RepoResult<Option<Article>> {
        sqlx::query_as::<_, Article>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(logged("get_article"))
    }

    async fn get_article_by_slug(&self, slug: &str) -> RepoResult<Option<Article>> {
        sqlx::query_as::<_, Article>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(logged("get_article_by_slug"))
    }

    async fn article_title_taken(&self, title: &str, except: Option<i64>) -> RepoResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS (
                   SELECT 1 FROM articles
                   WHERE title = $1 AND ($2::BIGINT IS NULL OR id <> $2)
               )"#,
        )
        .bind(title)
        .bind(except)
        .fetch_one(&self.pool)
        .await
        .map_err(logged("article_title_taken"))
    }

    async fn articles_for_topic(&self, topic_id: i64) -> RepoResult<Vec<Article>> {
        sqlx::query_as::<_, Article>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE topic_id = $1 ORDER BY id"
        ))
        .bind(topic_id)
        .fetch_all(&self.pool)
        .await
        .map_err(logged("articles_for_topic"))
    }

    async fn articles_for_user(&self, user_id: i64) -> RepoResult<Vec<ArticleWithTopic>> {
        sqlx::query_as::<_, ArticleWithTopic>(
            r#"
            SELECT a.id, a.title, a.text, a.slug, a.status, a.topic_id, a.user_id,
                   a.created, a.modified, t.title AS topic_title
            FROM articles a
            JOIN topics t ON t.id = a.topic_id
            WHERE a.user_id = $1
            ORDER BY a.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(logged("articles_for_user"))
    }

    /// create_article
    ///
    /// The slug is derived from the same instant stored in `created`. A slug
    /// already taken by another article moves on to the next candidate.
    async fn create_article(&self, author_id: i64, draft: ArticleDraft) -> RepoResult<Article> {
        let now = Utc::now();
        for attempt in 0..MAX_SLUG_ATTEMPTS {
            let inserted = sqlx::query_as::<_, Article>(&format!(
                r#"INSERT INTO articles (title, text, slug, status, topic_id, user_id, created, modified)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
                   RETURNING {ARTICLE_COLUMNS}"#
            ))
            .bind(&draft.title)
            .bind(&draft.text)
            .bind(article_slug(&draft.title, now, attempt))
            .bind(ArticleStatus::Draft)
            .bind(draft.topic_id)
            .bind(author_id)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique);

            match inserted {
                Err(RepoError::Conflict(UniqueField::ArticleSlug)) => {
                    tracing::debug!("slug candidate {} for '{}' taken", attempt, draft.title);
                }
                other => return other,
            }
        }
        Err(RepoError::Conflict(UniqueField::ArticleSlug))
    }

    /// update_article
    ///
    /// `COALESCE` keeps any column whose change is `None`.
    async fn update_article(&self, id: i64, changes: ArticleChanges) -> RepoResult<Article> {
        sqlx::query_as::<_, Article>(&format!(
            r#"UPDATE articles
               SET title = COALESCE($2, title),
                   text = COALESCE($3, text),
                   topic_id = COALESCE($4, topic_id),
                   modified = NOW()
               WHERE id = $1
               RETURNING {ARTICLE_COLUMNS}"#
        ))
        .bind(id)
        .bind(changes.title)
        .bind(changes.text)
        .bind(changes.topic_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_unique)?
        .ok_or(RepoError::NotFound)
    }

    async fn publish_article(&self, id: i64) -> RepoResult<Article> {
        sqlx::query_as::<_, Article>(&format!(
            r#"UPDATE articles SET status = $2, modified = NOW()
               WHERE id = $1
               RETURNING {ARTICLE_COLUMNS}"#
        ))
        .bind(id)
        .bind(ArticleStatus::Published)
        .fetch_optional(&self.pool)
        .await
        .map_err(logged("publish_article"))?
        .ok_or(RepoError::NotFound)
    }

    async fn delete_article(&self, id: i64) -> RepoResult<()> {
        let result = sqlx::query("DELETE FROM articles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(logged("delete_article"))?;
        if result.rows_affected() > 0 {
            Ok(())
        } else {
            Err(RepoError::NotFound)
        }
    }
}
