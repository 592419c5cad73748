use async_trait::async_trait;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use bloggy_api::{
    ApiError, AppState, InMemoryRepository,
    auth::{Actor, AuthUser},
    config::AppConfig,
    extract::{PathId, Payload},
    handlers,
    models::{
        Article, ArticleChanges, ArticleDraft, ArticleStatus, ArticleWithTopic, NewUser, Topic,
        TopicSummary, User,
    },
    query::{ArticleQuery, ArticleSearch},
    repository::{RepoError, RepoResult, Repository},
    serializers::{self, ArticleInput, TopicInput},
};
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::test;

// --- MOCK REPOSITORY IMPLEMENTATION ---

// Every call fails like a dropped database connection and is counted, so
// tests can prove a denied request never reached the store.
#[derive(Default)]
pub struct UnavailableRepo {
    pub calls: AtomicUsize,
}

impl UnavailableRepo {
    fn fail<T>(&self) -> RepoResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RepoError::Database(sqlx::Error::PoolTimedOut))
    }
}

#[async_trait]
impl Repository for UnavailableRepo {
    async fn get_user(&self, _id: i64) -> RepoResult<Option<User>> {
        self.fail()
    }
    async fn find_user_by_username(&self, _username: &str) -> RepoResult<Option<User>> {
        self.fail()
    }
    async fn email_taken(&self, _email: &str) -> RepoResult<bool> {
        self.fail()
    }
    async fn create_user(&self, _user: NewUser) -> RepoResult<User> {
        self.fail()
    }
    async fn list_topics(&self) -> RepoResult<Vec<TopicSummary>> {
        self.fail()
    }
    async fn get_topic(&self, _id: i64) -> RepoResult<Option<Topic>> {
        self.fail()
    }
    async fn topic_title_taken(&self, _title: &str) -> RepoResult<bool> {
        self.fail()
    }
    async fn create_topic(&self, _title: String) -> RepoResult<Topic> {
        self.fail()
    }
    async fn list_articles(&self, _query: &ArticleQuery) -> RepoResult<Vec<Article>> {
        self.fail()
    }
    async fn get_article(&self, _id: i64) -> RepoResult<Option<Article>> {
        self.fail()
    }
    async fn get_article_by_slug(&self, _slug: &str) -> RepoResult<Option<Article>> {
        self.fail()
    }
    async fn article_title_taken(&self, _title: &str, _except: Option<i64>) -> RepoResult<bool> {
        self.fail()
    }
    async fn articles_for_topic(&self, _topic_id: i64) -> RepoResult<Vec<Article>> {
        self.fail()
    }
    async fn articles_for_user(&self, _user_id: i64) -> RepoResult<Vec<ArticleWithTopic>> {
        self.fail()
    }
    async fn create_article(&self, _author_id: i64, _draft: ArticleDraft) -> RepoResult<Article> {
        self.fail()
    }
    async fn update_article(&self, _id: i64, _changes: ArticleChanges) -> RepoResult<Article> {
        self.fail()
    }
    async fn publish_article(&self, _id: i64) -> RepoResult<Article> {
        self.fail()
    }
    async fn delete_article(&self, _id: i64) -> RepoResult<()> {
        self.fail()
    }
}

// --- TEST UTILITIES ---

struct Fixture {
    state: AppState,
    repo: Arc<InMemoryRepository>,
    author: User,
    staff: User,
    topic: Topic,
}

async fn fixture() -> Fixture {
    let repo = Arc::new(InMemoryRepository::frozen_at(
        Utc.with_ymd_and_hms(2021, 11, 4, 9, 30, 0).unwrap(),
    ));
    let author = repo
        .create_user(NewUser {
            username: "author".into(),
            email: "author@example.com".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            ..NewUser::default()
        })
        .await
        .unwrap();
    let staff = repo
        .create_user(NewUser {
            username: "staff".into(),
            email: "staff@example.com".into(),
            is_staff: true,
            ..NewUser::default()
        })
        .await
        .unwrap();
    let topic = repo.create_topic("Rust".into()).await.unwrap();

    let state = AppState::new(repo.clone(), AppConfig::default());
    Fixture {
        state,
        repo,
        author,
        staff,
        topic,
    }
}

fn as_actor(user: &User) -> Actor {
    Actor::User(AuthUser::from(user))
}

fn article_input(title: &str, topic_url: String) -> ArticleInput {
    ArticleInput {
        title: Some(json!(title)),
        text: Some(json!("body")),
        topic: Some(json!(topic_url)),
    }
}

// --- HANDLER TESTS ---

#[test]
async fn test_create_article_assigns_the_caller_as_owner() {
    let fx = fixture().await;
    let topic_url = fx.state.links().topic(fx.topic.id);

    let (status, Json(body)) = handlers::create_article(
        State(fx.state.clone()),
        as_actor(&fx.author),
        Ok(Payload(article_input("First", topic_url.clone()))),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body.user, fx.state.links().user(fx.author.id));
    assert_eq!(body.topic, topic_url);
    assert_eq!(body.status, ArticleStatus::Draft);
    assert_eq!(body.created, "2021-04-11 09:30");

    let stored = fx.repo.list_articles(&ArticleQuery::all()).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].user_id, fx.author.id);
}

#[test]
async fn test_anonymous_create_is_refused_before_the_body_is_read() {
    let fx = fixture().await;

    let result = handlers::create_article(
        State(fx.state.clone()),
        Actor::Anonymous,
        Err(ApiError::Parse("JSON parse error - boom".into())),
    )
    .await;

    assert!(matches!(result, Err(ApiError::NotAuthenticated)));
}

#[test]
async fn test_duplicate_title_is_a_field_error() {
    let fx = fixture().await;
    let topic_url = fx.state.links().topic(fx.topic.id);
    handlers::create_article(
        State(fx.state.clone()),
        as_actor(&fx.author),
        Ok(Payload(article_input("Taken", topic_url.clone()))),
    )
    .await
    .unwrap();

    let err = handlers::create_article(
        State(fx.state.clone()),
        as_actor(&fx.staff),
        Ok(Payload(article_input("Taken", topic_url))),
    )
    .await
    .unwrap_err();

    match err {
        ApiError::Validation(errors) => assert_eq!(
            errors.get("title"),
            Some(&[serializers::ARTICLE_TITLE_TAKEN.to_string()][..])
        ),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
async fn test_non_owner_update_leaves_the_article_untouched() {
    let fx = fixture().await;
    let intruder = fx
        .repo
        .create_user(NewUser {
            username: "intruder".into(),
            email: "intruder@example.com".into(),
            ..NewUser::default()
        })
        .await
        .unwrap();
    let article = fx
        .repo
        .create_article(
            fx.author.id,
            ArticleDraft {
                title: "Mine".into(),
                text: "original".into(),
                topic_id: fx.topic.id,
            },
        )
        .await
        .unwrap();

    let result = handlers::partial_update_article(
        State(fx.state.clone()),
        as_actor(&intruder),
        PathId(article.id),
        Ok(Payload(ArticleInput {
            text: Some(json!("defaced")),
            ..ArticleInput::default()
        })),
    )
    .await;

    assert!(matches!(result, Err(ApiError::PermissionDenied)));
    let stored = fx.repo.get_article(article.id).await.unwrap().unwrap();
    assert_eq!(stored.text, "original");
}

#[test]
async fn test_staff_may_patch_any_article() {
    let fx = fixture().await;
    let article = fx
        .repo
        .create_article(
            fx.author.id,
            ArticleDraft {
                title: "Mine".into(),
                text: "original".into(),
                topic_id: fx.topic.id,
            },
        )
        .await
        .unwrap();

    let Json(body) = handlers::partial_update_article(
        State(fx.state.clone()),
        as_actor(&fx.staff),
        PathId(article.id),
        Ok(Payload(ArticleInput {
            text: Some(json!("edited")),
            ..ArticleInput::default()
        })),
    )
    .await
    .unwrap();

    assert_eq!(body.text, "edited");
    assert_eq!(body.title, "Mine");
    // Ownership never moves to the editor.
    assert_eq!(body.user, fx.state.links().user(fx.author.id));
}

#[test]
async fn test_publish_by_staff() {
    let fx = fixture().await;
    let article = fx
        .repo
        .create_article(
            fx.author.id,
            ArticleDraft {
                title: "News".into(),
                text: "body".into(),
                topic_id: fx.topic.id,
            },
        )
        .await
        .unwrap();

    let Json(detail) = handlers::publish_article(
        State(fx.state.clone()),
        as_actor(&fx.staff),
        PathId(article.id),
    )
    .await
    .unwrap();

    assert_eq!(detail.detail, "Article 'News' has been successfully published!");
    let stored = fx.repo.get_article(article.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ArticleStatus::Published);
}

#[test]
async fn test_create_topic_requires_staff() {
    let fx = fixture().await;
    let input = || {
        Ok(Payload(TopicInput {
            title: Some(json!("Go")),
        }))
    };

    let denied = handlers::create_topic(State(fx.state.clone()), as_actor(&fx.author), input()).await;
    assert!(matches!(denied, Err(ApiError::PermissionDenied)));

    let (status, Json(topic)) =
        handlers::create_topic(State(fx.state.clone()), as_actor(&fx.staff), input())
            .await
            .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(topic.title, "Go");
    assert_eq!(topic.articles_count, 0);
}

#[test]
async fn test_get_user_not_found() {
    let fx = fixture().await;
    let result = handlers::get_user(State(fx.state), Actor::Anonymous, PathId(404)).await;
    assert!(matches!(result, Err(ApiError::NotFound)));
}

#[test]
async fn test_feed_hides_drafts_by_slug() {
    let fx = fixture().await;
    let article = fx
        .repo
        .create_article(
            fx.author.id,
            ArticleDraft {
                title: "Hidden".into(),
                text: "body".into(),
                topic_id: fx.topic.id,
            },
        )
        .await
        .unwrap();

    let draft = handlers::get_feed_article(
        State(fx.state.clone()),
        Actor::Anonymous,
        Path(article.slug.clone()),
    )
    .await;
    assert!(matches!(draft, Err(ApiError::NotFound)));

    fx.repo.publish_article(article.id).await.unwrap();
    let Json(published) =
        handlers::get_feed_article(State(fx.state.clone()), Actor::Anonymous, Path(article.slug))
            .await
            .unwrap();
    assert_eq!(published.title, "Hidden");

    let Json(feed) = handlers::list_feed(
        State(fx.state),
        Actor::Anonymous,
        Query(ArticleSearch::default()),
    )
    .await
    .unwrap();
    assert_eq!(feed.len(), 1);
}

#[test]
async fn test_store_failures_become_500() {
    let state = AppState::new(Arc::new(UnavailableRepo::default()), AppConfig::default());

    let err = handlers::list_topics(State(state), Actor::Anonymous)
        .await
        .unwrap_err();
    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
async fn test_denied_publish_never_touches_the_store() {
    let repo = Arc::new(UnavailableRepo::default());
    let state = AppState::new(repo.clone(), AppConfig::default());

    let result = handlers::publish_article(State(state), Actor::Anonymous, PathId(1)).await;

    assert!(matches!(result, Err(ApiError::NotAuthenticated)));
    assert_eq!(repo.calls.load(Ordering::SeqCst), 0);
}
