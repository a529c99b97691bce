use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use shared::{
    domain::{Article, ArticleId, Comment, CommentId, UserId, UserProfile},
    error::{ApiError, ErrorCode},
    protocol::{
        ArticlePatch, ArticleQuery, BlobStored, BlobUrl, CreatedResponse, Credentials,
        DisplayNameRequest, NewArticle, NewComment, NewProfile, Session,
    },
};
use storage::Storage;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod auth;
mod config;

use api::{ApiContext, Caller};
use app_state::{AppState, ClientKeys};
use auth::AuthConfig;
use config::{load_settings, prepare_database_url};

type HttpResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

/// Room for headers and framing on top of the largest accepted upload.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    if settings.admin_email.trim().is_empty() {
        warn!("PRESS_ADMIN_EMAIL not set; no account will be granted the admin role");
    }

    let api = ApiContext {
        storage,
        auth: AuthConfig {
            jwt_secret: settings.jwt_secret.clone(),
            ttl_seconds: settings.session_ttl_seconds,
        },
        admin_email: settings.admin_email.clone(),
        public_url: settings.public_url(),
        max_upload_bytes: settings.max_upload_bytes,
    };
    let state = AppState {
        api,
        client_keys: ClientKeys {
            api_key: settings.api_key.clone(),
            project_id: settings.project_id.clone(),
        },
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, public_url = %settings.public_url(), "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}

fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.api.max_upload_bytes + BODY_LIMIT_SLACK;
    Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/signup", post(http_sign_up))
        .route("/auth/login", post(http_log_in))
        .route("/auth/logout", post(http_log_out))
        .route("/auth/display_name", post(http_update_display_name))
        .route("/profiles", post(http_create_profile))
        .route("/profiles/:user_id", get(http_get_profile))
        .route("/articles", get(http_list_articles).post(http_create_article))
        .route(
            "/articles/:article_id",
            get(http_get_article)
                .patch(http_patch_article)
                .delete(http_delete_article),
        )
        .route(
            "/articles/:article_id/comments",
            get(http_list_comments).post(http_create_comment),
        )
        .route(
            "/articles/:article_id/comments/:comment_id",
            axum::routing::delete(http_delete_comment),
        )
        .route("/blobs/:bucket/*path", put(http_put_blob).get(http_get_blob))
        .route("/blob-url/:bucket/*path", get(http_blob_url))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_client_keys,
        ))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health checks and blob downloads are reachable without client keys so
/// stored image URLs work from anywhere.
fn is_public(request: &Request) -> bool {
    let path = request.uri().path();
    path == "/healthz" || (request.method() == Method::GET && path.starts_with("/blobs/"))
}

async fn require_client_keys(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if is_public(&request) || state.client_keys.admits(request.headers()) {
        return next.run(request).await;
    }
    warn!(path = %request.uri().path(), "request without valid client keys");
    reject(ApiError::new(
        ErrorCode::Unauthorized,
        "missing or invalid api key",
    ))
    .into_response()
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    if err.code == ErrorCode::Internal {
        error!(message = %err.message, "request failed");
    }
    (status_for(err.code), Json(err))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn caller(state: &AppState, headers: &HeaderMap) -> HttpResult<Caller> {
    let token = bearer_token(headers).ok_or_else(|| {
        reject(ApiError::new(
            ErrorCode::Unauthorized,
            "you must be signed in",
        ))
    })?;
    api::authenticate(&state.api, token).await.map_err(reject)
}

async fn healthz(State(state): State<Arc<AppState>>) -> HttpResult<&'static str> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(|e| reject(ApiError::new(ErrorCode::Internal, e.to_string())))?;
    Ok("ok")
}

async fn http_sign_up(
    State(state): State<Arc<AppState>>,
    Json(req): Json<Credentials>,
) -> HttpResult<Json<Session>> {
    api::sign_up(&state.api, &req).await.map(Json).map_err(reject)
}

async fn http_log_in(
    State(state): State<Arc<AppState>>,
    Json(req): Json<Credentials>,
) -> HttpResult<Json<Session>> {
    api::log_in(&state.api, &req).await.map(Json).map_err(reject)
}

async fn http_log_out(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> HttpResult<StatusCode> {
    let caller = caller(&state, &headers).await?;
    api::log_out(&state.api, &caller).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_update_display_name(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<DisplayNameRequest>,
) -> HttpResult<StatusCode> {
    let caller = caller(&state, &headers).await?;
    api::update_display_name(&state.api, &caller, &req.display_name)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_get_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
) -> HttpResult<Json<UserProfile>> {
    caller(&state, &headers).await?;
    api::get_profile(&state.api, UserId(user_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<NewProfile>,
) -> HttpResult<Json<UserProfile>> {
    let caller = caller(&state, &headers).await?;
    api::create_profile(&state.api, &caller, &req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_articles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ArticleQuery>,
) -> HttpResult<Json<Vec<Article>>> {
    api::list_articles(&state.api, &query)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_get_article(
    State(state): State<Arc<AppState>>,
    Path(article_id): Path<i64>,
) -> HttpResult<Json<Article>> {
    api::get_article(&state.api, ArticleId(article_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_article(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<NewArticle>,
) -> HttpResult<(StatusCode, Json<CreatedResponse>)> {
    let caller = caller(&state, &headers).await?;
    let article_id = api::create_article(&state.api, &caller, &req)
        .await
        .map_err(reject)?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse { id: article_id.0 }),
    ))
}

async fn http_patch_article(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(article_id): Path<i64>,
    Json(patch): Json<ArticlePatch>,
) -> HttpResult<StatusCode> {
    let caller = caller(&state, &headers).await?;
    api::patch_article(&state.api, &caller, ArticleId(article_id), &patch)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_delete_article(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(article_id): Path<i64>,
) -> HttpResult<StatusCode> {
    let caller = caller(&state, &headers).await?;
    api::delete_article(&state.api, &caller, ArticleId(article_id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_list_comments(
    State(state): State<Arc<AppState>>,
    Path(article_id): Path<i64>,
) -> HttpResult<Json<Vec<Comment>>> {
    api::list_comments(&state.api, ArticleId(article_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_comment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(article_id): Path<i64>,
    Json(req): Json<NewComment>,
) -> HttpResult<(StatusCode, Json<CreatedResponse>)> {
    let caller = caller(&state, &headers).await?;
    let comment_id = api::create_comment(&state.api, &caller, ArticleId(article_id), &req)
        .await
        .map_err(reject)?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse { id: comment_id.0 }),
    ))
}

async fn http_delete_comment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((article_id, comment_id)): Path<(i64, i64)>,
) -> HttpResult<StatusCode> {
    let caller = caller(&state, &headers).await?;
    api::delete_comment(
        &state.api,
        &caller,
        ArticleId(article_id),
        CommentId(comment_id),
    )
    .await
    .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_put_blob(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((bucket, path)): Path<(String, String)>,
    body: Bytes,
) -> HttpResult<Json<BlobStored>> {
    let caller = caller(&state, &headers).await?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    api::store_blob(&state.api, &caller, &bucket, &path, content_type, &body)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_get_blob(
    State(state): State<Arc<AppState>>,
    Path((bucket, path)): Path<(String, String)>,
) -> HttpResult<impl IntoResponse> {
    let blob = api::load_blob(&state.api, &bucket, &path)
        .await
        .map_err(reject)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&blob.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    Ok((StatusCode::OK, headers, blob.bytes))
}

async fn http_blob_url(
    State(state): State<Arc<AppState>>,
    Path((bucket, path)): Path<(String, String)>,
) -> HttpResult<Json<BlobUrl>> {
    let url = api::blob_url(&state.api, &bucket, &path)
        .await
        .map_err(reject)?;
    Ok(Json(BlobUrl { url }))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
