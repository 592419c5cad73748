use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    auth::{self, Actor},
    error::{ApiError, ErrorDetail, TOKEN_INVALID_OR_EXPIRED},
    extract::{PathId, Payload},
    permissions::{Action, ArticleAction, TopicAction, UserAction, decide},
    query::{ArticleQuery, ArticleSearch},
    serializers::{
        self, AccessToken, ArticleInput, ArticleRepresentation, Detail, PublishedArticle,
        RefreshRequest, RegisterRequest, TokenPair, TokenRequest, TopicDetail, TopicInput,
        TopicListItem, UserRepresentation,
    },
    visibility,
};

type ApiResult<T> = Result<T, ApiError>;

// --- Users ---

/// get_user
///
/// [Public Route] A user's profile together with every article they wrote.
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = UserRepresentation),
        (status = 404, description = "Not Found", body = ErrorDetail)
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    actor: Actor,
    PathId(id): PathId,
) -> ApiResult<Json<UserRepresentation>> {
    decide(&actor, Action::User(UserAction::Retrieve))?;

    let user = state.repo.get_user(id).await?.ok_or(ApiError::NotFound)?;
    let articles = state.repo.articles_for_user(user.id).await?;
    Ok(Json(UserRepresentation::build(&user, &articles)))
}

/// register_user
///
/// [Public Route] Creates a regular (non-staff) account.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = UserRepresentation),
        (status = 400, description = "Invalid fields")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    actor: Actor,
    Payload(input): Payload<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserRepresentation>)> {
    decide(&actor, Action::User(UserAction::Register))?;

    let registration = serializers::validate_register(state.repo.as_ref(), input).await?;
    let password_hash = auth::hash_password(&registration.password)?;
    let user = state
        .repo
        .create_user(registration.into_new_user(password_hash))
        .await?;

    tracing::info!("Registered user {} ({})", user.id, user.username);
    Ok((StatusCode::CREATED, Json(UserRepresentation::build(&user, &[]))))
}

// --- Topics ---

/// list_topics
///
/// [Public Route] Every topic with its article count.
#[utoipa::path(
    get,
    path = "/topics",
    responses((status = 200, description = "Topics", body = [TopicListItem]))
)]
pub async fn list_topics(
    State(state): State<AppState>,
    actor: Actor,
) -> ApiResult<Json<Vec<TopicListItem>>> {
    decide(&actor, Action::Topic(TopicAction::List))?;

    let links = state.links();
    let topics = state.repo.list_topics().await?;
    Ok(Json(
        topics
            .iter()
            .map(|summary| TopicListItem::build(summary, &links))
            .collect(),
    ))
}

/// create_topic
///
/// [Staff Route] Adds a topic. Titles are unique.
///
/// The permission check runs before the body is even decoded, so an anonymous
/// caller sending garbage still gets a 401.
#[utoipa::path(
    post,
    path = "/topics",
    request_body = TopicInput,
    responses(
        (status = 201, description = "Created", body = TopicListItem),
        (status = 400, description = "Invalid fields"),
        (status = 401, description = "Not authenticated", body = ErrorDetail),
        (status = 403, description = "Not staff", body = ErrorDetail)
    )
)]
pub async fn create_topic(
    State(state): State<AppState>,
    actor: Actor,
    payload: Result<Payload<TopicInput>, ApiError>,
) -> ApiResult<(StatusCode, Json<TopicListItem>)> {
    decide(&actor, Action::Topic(TopicAction::Create))?;
    let Payload(input) = payload?;

    let title = serializers::validate_topic(state.repo.as_ref(), input).await?;
    let topic = state.repo.create_topic(title).await?;

    tracing::info!("Topic {} '{}' created", topic.id, topic.title);
    Ok((
        StatusCode::CREATED,
        Json(TopicListItem::fresh(&topic, &state.links())),
    ))
}

/// get_topic
///
/// [Public Route] A topic with its articles in reduced form.
#[utoipa::path(
    get,
    path = "/topics/{id}",
    params(("id" = i64, Path, description = "Topic ID")),
    responses(
        (status = 200, description = "Found", body = TopicDetail),
        (status = 404, description = "Not Found", body = ErrorDetail)
    )
)]
pub async fn get_topic(
    State(state): State<AppState>,
    actor: Actor,
    PathId(id): PathId,
) -> ApiResult<Json<TopicDetail>> {
    decide(&actor, Action::Topic(TopicAction::Retrieve))?;

    let topic = state.repo.get_topic(id).await?.ok_or(ApiError::NotFound)?;
    let articles = state.repo.articles_for_topic(topic.id).await?;
    Ok(Json(TopicDetail::build(&topic, &articles, &state.links())))
}

// --- Articles ---

/// list_articles
///
/// [Public Route] All articles, drafts included, optionally narrowed by
/// `?search=`.
#[utoipa::path(
    get,
    path = "/articles",
    params(ArticleSearch),
    responses((status = 200, description = "Articles", body = [ArticleRepresentation]))
)]
pub async fn list_articles(
    State(state): State<AppState>,
    actor: Actor,
    Query(search): Query<ArticleSearch>,
) -> ApiResult<Json<Vec<ArticleRepresentation>>> {
    decide(&actor, Action::Article(ArticleAction::List))?;

    let query = ArticleQuery::from(search);
    let links = state.links();
    let articles = state.repo.list_articles(&query).await?;
    tracing::debug!(search = ?query.term(), matched = articles.len(), "article listing");

    Ok(Json(
        articles
            .iter()
            .map(|article| ArticleRepresentation::build(article, &links))
            .collect(),
    ))
}

/// create_article
///
/// [Authenticated Route] The author is always the caller; the payload has no
/// way to name one.
#[utoipa::path(
    post,
    path = "/articles",
    request_body = ArticleInput,
    responses(
        (status = 201, description = "Created", body = ArticleRepresentation),
        (status = 400, description = "Invalid fields"),
        (status = 401, description = "Not authenticated", body = ErrorDetail)
    )
)]
pub async fn create_article(
    State(state): State<AppState>,
    actor: Actor,
    payload: Result<Payload<ArticleInput>, ApiError>,
) -> ApiResult<(StatusCode, Json<ArticleRepresentation>)> {
    decide(&actor, Action::Article(ArticleAction::Create))?;
    let author = actor.user().ok_or(ApiError::NotAuthenticated)?;
    let Payload(input) = payload?;

    let links = state.links();
    let draft = serializers::validate_article_create(state.repo.as_ref(), &links, input).await?;
    let article = state.repo.create_article(author.id, draft).await?;

    tracing::info!("Article {} created by user {}", article.id, author.id);
    Ok((
        StatusCode::CREATED,
        Json(ArticleRepresentation::build(&article, &links)),
    ))
}

/// get_article
///
/// [Public Route] One article by primary key.
#[utoipa::path(
    get,
    path = "/articles/{id}",
    params(("id" = i64, Path, description = "Article ID")),
    responses(
        (status = 200, description = "Found", body = ArticleRepresentation),
        (status = 404, description = "Not Found", body = ErrorDetail)
    )
)]
pub async fn get_article(
    State(state): State<AppState>,
    actor: Actor,
    PathId(id): PathId,
) -> ApiResult<Json<ArticleRepresentation>> {
    decide(&actor, Action::Article(ArticleAction::Retrieve))?;

    let article = state.repo.get_article(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(ArticleRepresentation::build(&article, &state.links())))
}

/// Shared body of PUT and PATCH.
async fn update_article(
    state: AppState,
    actor: Actor,
    id: i64,
    payload: Result<Payload<ArticleInput>, ApiError>,
    partial: bool,
) -> ApiResult<Json<ArticleRepresentation>> {
    let article = state.repo.get_article(id).await?.ok_or(ApiError::NotFound)?;
    let action = if partial {
        ArticleAction::PartialUpdate {
            owner_id: article.user_id,
        }
    } else {
        ArticleAction::Update {
            owner_id: article.user_id,
        }
    };
    decide(&actor, Action::Article(action)).inspect_err(|denial| {
        tracing::debug!("update of article {} refused: {}", id, denial.reason());
    })?;
    let Payload(input) = payload?;

    let links = state.links();
    let changes =
        serializers::validate_article_update(state.repo.as_ref(), &links, id, input, partial)
            .await?;
    let updated = state.repo.update_article(id, changes).await?;

    tracing::info!("Article {} updated", updated.id);
    Ok(Json(ArticleRepresentation::build(&updated, &links)))
}

/// replace_article
///
/// [Owner or Staff Route] Full update: title, text and topic are all required.
#[utoipa::path(
    put,
    path = "/articles/{id}",
    params(("id" = i64, Path, description = "Article ID")),
    request_body = ArticleInput,
    responses(
        (status = 200, description = "Updated", body = ArticleRepresentation),
        (status = 400, description = "Invalid fields"),
        (status = 401, description = "Not authenticated", body = ErrorDetail),
        (status = 403, description = "Neither owner nor staff", body = ErrorDetail),
        (status = 404, description = "Not Found", body = ErrorDetail)
    )
)]
pub async fn replace_article(
    State(state): State<AppState>,
    actor: Actor,
    PathId(id): PathId,
    payload: Result<Payload<ArticleInput>, ApiError>,
) -> ApiResult<Json<ArticleRepresentation>> {
    update_article(state, actor, id, payload, false).await
}

/// partial_update_article
///
/// [Owner or Staff Route] Updates only the fields that were sent.
#[utoipa::path(
    patch,
    path = "/articles/{id}",
    params(("id" = i64, Path, description = "Article ID")),
    request_body = ArticleInput,
    responses(
        (status = 200, description = "Updated", body = ArticleRepresentation),
        (status = 400, description = "Invalid fields"),
        (status = 401, description = "Not authenticated", body = ErrorDetail),
        (status = 403, description = "Neither owner nor staff", body = ErrorDetail),
        (status = 404, description = "Not Found", body = ErrorDetail)
    )
)]
pub async fn partial_update_article(
    State(state): State<AppState>,
    actor: Actor,
    PathId(id): PathId,
    payload: Result<Payload<ArticleInput>, ApiError>,
) -> ApiResult<Json<ArticleRepresentation>> {
    update_article(state, actor, id, payload, true).await
}

/// delete_article
///
/// [Owner or Staff Route] Removes the article.
#[utoipa::path(
    delete,
    path = "/articles/{id}",
    params(("id" = i64, Path, description = "Article ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Not authenticated", body = ErrorDetail),
        (status = 403, description = "Neither owner nor staff", body = ErrorDetail),
        (status = 404, description = "Not Found", body = ErrorDetail)
    )
)]
pub async fn delete_article(
    State(state): State<AppState>,
    actor: Actor,
    PathId(id): PathId,
) -> ApiResult<StatusCode> {
    let article = state.repo.get_article(id).await?.ok_or(ApiError::NotFound)?;
    decide(
        &actor,
        Action::Article(ArticleAction::Destroy {
            owner_id: article.user_id,
        }),
    )?;

    state.repo.delete_article(id).await?;
    tracing::info!("Article {} deleted", id);
    Ok(StatusCode::NO_CONTENT)
}

/// publish_article
///
/// [Staff Route] Moves a draft to `published`. Publishing an already published
/// article succeeds again. The role is checked before the article is looked up.
#[utoipa::path(
    get,
    path = "/articles/{id}/publish",
    params(("id" = i64, Path, description = "Article ID")),
    responses(
        (status = 200, description = "Published", body = Detail),
        (status = 401, description = "Not authenticated", body = ErrorDetail),
        (status = 403, description = "Not staff", body = ErrorDetail),
        (status = 404, description = "Not Found", body = ErrorDetail)
    )
)]
pub async fn publish_article(
    State(state): State<AppState>,
    actor: Actor,
    PathId(id): PathId,
) -> ApiResult<Json<Detail>> {
    decide(&actor, Action::Article(ArticleAction::Publish))?;

    let article = state.repo.publish_article(id).await?;
    tracing::info!("Article {} published", article.id);
    Ok(Json(Detail::published(&article)))
}

// --- Tokens ---

/// obtain_token
///
/// [Public Route] Exchanges credentials for a refresh/access pair.
#[utoipa::path(
    post,
    path = "/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 400, description = "Missing fields"),
        (status = 401, description = "Bad credentials", body = ErrorDetail)
    )
)]
pub async fn obtain_token(
    State(state): State<AppState>,
    Payload(input): Payload<TokenRequest>,
) -> ApiResult<Json<TokenPair>> {
    let (username, password) = serializers::validate_token_request(input)?;
    let user = auth::authenticate(state.repo.as_ref(), &username, &password)
        .await
        .inspect_err(|_| tracing::debug!("token refused for '{}'", username))?;

    let (refresh, access) = state
        .tokens()
        .issue_pair(user.id)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(TokenPair { refresh, access }))
}

/// refresh_token
///
/// [Public Route] Exchanges a refresh token for a new access token.
#[utoipa::path(
    post,
    path = "/token/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = AccessToken),
        (status = 400, description = "Missing fields"),
        (status = 401, description = "Token is invalid or expired", body = ErrorDetail)
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Payload(input): Payload<RefreshRequest>,
) -> ApiResult<Json<AccessToken>> {
    let refresh = serializers::validate_refresh_request(input)?;
    let access = state
        .tokens()
        .refresh(&refresh)
        .map_err(|_| ApiError::TokenNotValid(TOKEN_INVALID_OR_EXPIRED))?;
    Ok(Json(AccessToken { access }))
}

// --- Public feed ---

/// list_feed
///
/// [Public Route] Published articles only. Search and visibility compose: the
/// query picks what matches, then drafts are dropped.
#[utoipa::path(
    get,
    path = "/feed",
    params(ArticleSearch),
    responses((status = 200, description = "Published articles", body = [PublishedArticle]))
)]
pub async fn list_feed(
    State(state): State<AppState>,
    actor: Actor,
    Query(search): Query<ArticleSearch>,
) -> ApiResult<Json<Vec<PublishedArticle>>> {
    decide(&actor, Action::Article(ArticleAction::List))?;

    let links = state.links();
    let matched = state.repo.list_articles(&ArticleQuery::from(search)).await?;
    Ok(Json(
        visibility::published_only(matched)
            .iter()
            .map(|article| PublishedArticle::build(article, &links))
            .collect(),
    ))
}

/// get_feed_article
///
/// [Public Route] One published article by slug. Drafts do not exist here.
#[utoipa::path(
    get,
    path = "/feed/{slug}",
    params(("slug" = String, Path, description = "Article slug")),
    responses(
        (status = 200, description = "Found", body = PublishedArticle),
        (status = 404, description = "Not Found", body = ErrorDetail)
    )
)]
pub async fn get_feed_article(
    State(state): State<AppState>,
    actor: Actor,
    Path(slug): Path<String>,
) -> ApiResult<Json<PublishedArticle>> {
    decide(&actor, Action::Article(ArticleAction::Retrieve))?;

    let article = state
        .repo
        .get_article_by_slug(&slug)
        .await?
        .filter(visibility::is_public)
        .ok_or(ApiError::NotFound)?;
    Ok(Json(PublishedArticle::build(&article, &state.links())))
}
