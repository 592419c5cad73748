use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::RwLock;

use crate::{
    models::{
        Article, ArticleChanges, ArticleDraft, ArticleStatus, ArticleWithTopic, NewUser, Topic,
        TopicSummary, User, article_slug,
    },
    query::ArticleQuery,
    repository::{MAX_SLUG_ATTEMPTS, RepoError, RepoResult, Repository, UniqueField},
};

/// Source of "now" for timestamps and slugs.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    topics: BTreeMap<i64, Topic>,
    articles: BTreeMap<i64, Article>,
    last_user_id: i64,
    last_topic_id: i64,
    last_article_id: i64,
}

/// InMemoryRepository
///
/// A process-local `Repository` for tests and database-less local runs.
/// Each write takes the table lock once, so uniqueness checks and inserts are
/// atomic with respect to each other, like the constraints in the SQL schema.
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
    clock: Clock,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            clock,
        }
    }

    /// Every timestamp this store writes will be `instant`.
    pub fn frozen_at(instant: DateTime<Utc>) -> Self {
        Self::with_clock(Arc::new(move || instant))
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: i64) -> RepoResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn email_taken(&self, email: &str) -> RepoResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().any(|user| user.email == email))
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(RepoError::Conflict(UniqueField::Username));
        }
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(RepoError::Conflict(UniqueField::Email));
        }

        tables.last_user_id += 1;
        let created = User {
            id: tables.last_user_id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_staff: user.is_staff,
            password_hash: user.password_hash,
            date_joined: (self.clock)(),
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_topics(&self) -> RepoResult<Vec<TopicSummary>> {
        let tables = self.tables.read().await;
        Ok(tables
            .topics
            .values()
            .map(|topic| TopicSummary {
                topic: topic.clone(),
                articles_count: tables
                    .articles
                    .values()
                    .filter(|a| a.topic_id == topic.id)
                    .count() as i64,
            })
            .collect())
    }

    async fn get_topic(&self, id: i64) -> RepoResult<Option<Topic>> {
        Ok(self.tables.read().await.topics.get(&id).cloned())
    }

    async fn topic_title_taken(&self, title: &str) -> RepoResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables.topics.values().any(|topic| topic.title == title))
    }

    async fn create_topic(&self, title: String) -> RepoResult<Topic> {
        let mut tables = self.tables.write().await;
        if tables.topics.values().any(|topic| topic.title == title) {
            return Err(RepoError::Conflict(UniqueField::TopicTitle));
        }

        tables.last_topic_id += 1;
        let topic = Topic {
            id: tables.last_topic_id,
            title,
        };
        tables.topics.insert(topic.id, topic.clone());
        Ok(topic)
    }

    async fn list_articles(&self, query: &ArticleQuery) -> RepoResult<Vec<Article>> {
        let tables = self.tables.read().await;
        Ok(query.apply(tables.articles.values().cloned()))
    }

    async fn get_article(&self, id: i64) -> RepoResult<Option<Article>> {
        Ok(self.tables.read().await.articles.get(&id).cloned())
    }

    async fn get_article_by_slug(&self, slug: &str) -> RepoResult<Option<Article>> {
        let tables = self.tables.read().await;
        Ok(tables.articles.values().find(|a| a.slug == slug).cloned())
    }

    async fn article_title_taken(&self, title: &str, except: Option<i64>) -> RepoResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .articles
            .values()
            .any(|a| a.title == title && Some(a.id) != except))
    }

    async fn articles_for_topic(&self, topic_id: i64) -> RepoResult<Vec<Article>> {
        let tables = self.tables.read().await;
        Ok(tables
            .articles
            .values()
            .filter(|a| a.topic_id == topic_id)
            .cloned()
            .collect())
    }

    async fn articles_for_user(&self, user_id: i64) -> RepoResult<Vec<ArticleWithTopic>> {
        let tables = self.tables.read().await;
        tables
            .articles
            .values()
            .filter(|a| a.user_id == user_id)
            .map(|article| {
                let topic = tables
                    .topics
                    .get(&article.topic_id)
                    .ok_or(RepoError::NotFound)?;
                Ok(ArticleWithTopic {
                    article: article.clone(),
                    topic_title: topic.title.clone(),
                })
            })
            .collect()
    }

    async fn create_article(&self, author_id: i64, draft: ArticleDraft) -> RepoResult<Article> {
        let mut tables = self.tables.write().await;
        // Foreign keys.
        if !tables.users.contains_key(&author_id) || !tables.topics.contains_key(&draft.topic_id) {
            return Err(RepoError::NotFound);
        }

        let now = (self.clock)();
        let slug = (0..MAX_SLUG_ATTEMPTS)
            .map(|attempt| article_slug(&draft.title, now, attempt))
            .find(|slug| !tables.articles.values().any(|a| &a.slug == slug))
            .ok_or(RepoError::Conflict(UniqueField::ArticleSlug))?;

        tables.last_article_id += 1;
        let article = Article {
            id: tables.last_article_id,
            title: draft.title,
            text: draft.text,
            slug,
            status: ArticleStatus::Draft,
            topic_id: draft.topic_id,
            user_id: author_id,
            created: now,
            modified: now,
        };
        tables.articles.insert(article.id, article.clone());
        Ok(article)
    }

    async fn update_article(&self, id: i64, changes: ArticleChanges) -> RepoResult<Article> {
        let mut tables = self.tables.write().await;
        if let Some(topic_id) = changes.topic_id {
            if !tables.topics.contains_key(&topic_id) {
                return Err(RepoError::NotFound);
            }
        }

        let now = (self.clock)();
        let article = tables.articles.get_mut(&id).ok_or(RepoError::NotFound)?;
        changes.apply_to(article);
        article.modified = now;
        Ok(article.clone())
    }

    async fn publish_article(&self, id: i64) -> RepoResult<Article> {
        let now = (self.clock)();
        let mut tables = self.tables.write().await;
        let article = tables.articles.get_mut(&id).ok_or(RepoError::NotFound)?;
        article.status = ArticleStatus::Published;
        article.modified = now;
        Ok(article.clone())
    }

    async fn delete_article(&self, id: i64) -> RepoResult<()> {
        self.tables
            .write()
            .await
            .articles
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}
