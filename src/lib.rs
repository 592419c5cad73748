use axum::{
    Router,
    extract::FromRef,
    http::{HeaderName, Method},
    routing::get,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod links;
pub mod memory;
pub mod models;
pub mod permissions;
pub mod query;
pub mod repository;
pub mod serializers;
pub mod tokens;
pub mod visibility;

pub mod routes;

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::ApiError;
pub use memory::InMemoryRepository;
pub use repository::{PostgresRepository, RepositoryState};

use error::ErrorDetail;
use links::Links;
use tokens::TokenService;

/// ApiDoc
///
/// OpenAPI document aggregated from every `#[utoipa::path]` handler and the
/// wire types they use. Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_user, handlers::register_user,
        handlers::list_topics, handlers::create_topic, handlers::get_topic,
        handlers::list_articles, handlers::create_article, handlers::get_article,
        handlers::replace_article, handlers::partial_update_article,
        handlers::delete_article, handlers::publish_article,
        handlers::obtain_token, handlers::refresh_token,
        handlers::list_feed, handlers::get_feed_article
    ),
    components(
        schemas(
            models::ArticleStatus, ErrorDetail,
            serializers::ArticleInput, serializers::TopicInput, serializers::TokenRequest,
            serializers::RefreshRequest, serializers::RegisterRequest,
            serializers::UserRepresentation, serializers::UserPost,
            serializers::ArticleRepresentation, serializers::PublishedArticle,
            serializers::TopicArticle, serializers::TopicListItem, serializers::TopicDetail,
            serializers::TokenPair, serializers::AccessToken, serializers::Detail,
        )
    ),
    tags(
        (name = "bloggy", description = "Blog publishing API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single container of shared services, cloned into every request.
#[derive(Clone)]
pub struct AppState {
    /// Entity Store, either PostgreSQL or in-memory.
    pub repo: RepositoryState,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        Self { repo, config }
    }

    /// Reference builder rooted at the configured public URL.
    pub fn links(&self) -> Links {
        Links::new(self.config.public_base_url.as_str())
    }

    pub fn tokens(&self) -> TokenService {
        TokenService::from_config(&self.config)
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles every resource router, the documentation and the JSON fallbacks,
/// then wraps the whole thing in the observability and CORS layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        .merge(routes::users::routes())
        .merge(routes::topics::routes())
        .merge(routes::articles::routes())
        .merge(routes::tokens::routes())
        .merge(routes::feed::routes())
        // Applies to every route registered above: a known path with an
        // unsupported verb.
        .method_not_allowed_fallback(|method: Method| async move {
            ApiError::MethodNotAllowed(method)
        })
        .fallback(|| async { ApiError::NotFound })
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer`: method, uri and the `x-request-id` generated above,
/// so every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
