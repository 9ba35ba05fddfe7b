use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use orbitask_ai::AiClient;
use orbitask_auth::{AuthError, Authenticator, Claims};
use orbitask_domain::{Board, Role, Station};
use orbitask_store::{Store, StoreError, TaskDetail};
use serde::Serialize;
use ulid::Ulid;
use uuid::Uuid;

use crate::config::{AppConfig, StartupError};
use crate::metrics::Metrics;
use crate::rate_limit::RateLimiter;

mod ai;
mod auth;
mod boards;
mod comments;
mod lists;
mod members;
mod stations;
mod tasks;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    store: Store,
    auth: Authenticator,
    ai: Option<AiClient>,
    metrics: Metrics,
    rate_limiter: RateLimiter,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub async fn router(config: AppConfig) -> Result<Router, StartupError> {
    let store = Store::connect_and_migrate(
        &config.db_url,
        Duration::from_millis(config.store_write_timeout_ms),
    )
    .await
    .map_err(|err| StartupError {
        code: "ERR_DB_UNAVAILABLE",
        message: format!("failed to initialize store: {}", err),
    })?;

    let auth = Authenticator::new(
        &config.jwt_secret,
        Duration::from_secs(config.jwt_ttl_secs),
    )
    .map_err(|err| StartupError {
        code: "ERR_INVALID_CONFIG",
        message: err.message,
    })?;

    let ai = match config.ai_token.as_ref() {
        Some(token) => Some(
            AiClient::new(
                config.ai_url.clone(),
                token.clone(),
                config.ai_model.clone(),
                Duration::from_millis(config.ai_timeout_ms),
            )
            .map_err(|_| StartupError {
                code: "ERR_AI_UNAVAILABLE",
                message: "failed to initialize inference client".to_string(),
            })?,
        ),
        None => None,
    };

    let metrics = Metrics::new().map_err(|_| StartupError {
        code: "ERR_METRICS_INIT",
        message: "failed to initialize metrics registry".to_string(),
    })?;

    let rate_limiter = RateLimiter::new(
        Duration::from_secs(config.rate_limit_window_secs.max(1)),
        config.rate_limit_max_keys,
    );

    let state = AppState {
        config,
        store,
        auth,
        ai,
        metrics,
        rate_limiter,
    };

    Ok(Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/me", get(auth::me))
        .route("/api/stations", post(stations::create).get(stations::list))
        .route(
            "/api/stations/{id}",
            get(stations::get).put(stations::update).delete(stations::complete),
        )
        .route(
            "/api/stations/{station_id}/members",
            post(members::add).get(members::list),
        )
        .route(
            "/api/stations/{station_id}/members/{user_id}",
            put(members::update_role).delete(members::remove),
        )
        .route("/api/board-templates", get(boards::templates))
        .route(
            "/api/stations/{station_id}/boards",
            post(boards::create).get(boards::list),
        )
        .route(
            "/api/boards/{id}",
            get(boards::get).put(boards::update).delete(boards::remove),
        )
        .route(
            "/api/boards/{board_id}/lists",
            post(lists::create).get(lists::list),
        )
        .route("/api/lists/{id}", put(lists::rename).delete(lists::remove))
        .route("/api/lists/{id}/reorder", put(lists::reorder))
        .route("/api/lists/{list_id}/tasks", post(tasks::create))
        .route("/api/boards/{board_id}/tasks", get(tasks::list))
        .route(
            "/api/tasks/{id}",
            get(tasks::get).put(tasks::update).delete(tasks::remove),
        )
        .route("/api/tasks/{id}/assign", put(tasks::assign))
        .route("/api/tasks/{id}/move", put(tasks::relocate))
        .route(
            "/api/tasks/{task_id}/comments",
            post(comments::add).get(comments::list),
        )
        .route(
            "/api/comments/{id}",
            put(comments::update).delete(comments::remove),
        )
        .route("/api/stations/{station_id}/ai/ask", post(ai::ask_station))
        .route(
            "/api/stations/{station_id}/ai/suggestions",
            get(ai::station_suggestions),
        )
        .route("/api/stations/{station_id}/ai/summary", get(ai::station_summary))
        .route("/api/boards/{board_id}/ai/ask", post(ai::ask_board))
        .route("/api/tasks/{task_id}/ai/ask", post(ai::ask_task))
        .route("/api/ai/health", get(ai::health))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            record_http_metrics,
        ))
        .with_state(state))
}

async fn record_http_metrics(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().as_str().to_string();

    let started = Instant::now();
    let response = next.run(request).await;

    state.metrics.observe_http_request(
        &route,
        &method,
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct ReadyzResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, bool>,
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();

    let store_ready = tokio::time::timeout(Duration::from_millis(500), state.store.ping())
        .await
        .is_ok_and(|res| res.is_ok());
    checks.insert("store", store_ready);

    let all_ready = checks.values().all(|ok| *ok);
    let status = if all_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyzResponse {
            status: if all_ready { "ready" } else { "not_ready" },
            checks,
        }),
    )
}

async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn json_error(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: code.into(),
            message: message.into(),
        }),
    )
}

fn validation_error(message: impl Into<String>) -> ApiError {
    json_error(StatusCode::BAD_REQUEST, "ERR_VALIDATION", message)
}

fn not_found(message: impl Into<String>) -> ApiError {
    json_error(StatusCode::NOT_FOUND, "ERR_NOT_FOUND", message)
}

fn forbidden(message: impl Into<String>) -> ApiError {
    json_error(StatusCode::FORBIDDEN, "ERR_FORBIDDEN", message)
}

fn auth_error(err: AuthError) -> ApiError {
    json_error(StatusCode::UNAUTHORIZED, err.code, err.message)
}

/// Store failures never leak SQL detail to clients.
fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::Timeout => {
            tracing::error!("store operation timed out");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "ERR_STORE_TIMEOUT",
                "storage did not respond in time",
            )
        }
        StoreError::NotFound => not_found("resource not found"),
        other => {
            tracing::error!(error = %other, "store operation failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "ERR_INTERNAL",
                "internal server error",
            )
        }
    }
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Claims, ApiError> {
    state.auth.authenticate(headers).map_err(auth_error)
}

/// Resolves the caller against a station: 404 when the station is absent or
/// completed, 403 when the caller is neither owner nor member.
async fn station_role(
    state: &AppState,
    station_id: Uuid,
    user_id: Uuid,
) -> Result<(Station, Role), ApiError> {
    let access = state
        .store
        .station_access(station_id, user_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("station not found"))?;

    let role = access
        .role
        .ok_or_else(|| forbidden("you are not a member of this station"))?;

    Ok((access.station, role))
}

fn require_role(role: Role, min: Role) -> Result<(), ApiError> {
    if role < min {
        return Err(forbidden(format!(
            "this action requires at least the {} role",
            min.as_str()
        )));
    }
    Ok(())
}

async fn board_role(
    state: &AppState,
    board_id: Uuid,
    user_id: Uuid,
) -> Result<(Board, Station, Role), ApiError> {
    let board = state
        .store
        .find_board(board_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("board not found"))?;

    let (station, role) = station_role(state, board.station_id, user_id).await?;
    Ok((board, station, role))
}

async fn task_role(
    state: &AppState,
    task_id: Uuid,
    user_id: Uuid,
) -> Result<(TaskDetail, Station, Role), ApiError> {
    let task = state
        .store
        .find_task(task_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("task not found"))?;

    let (station, role) = station_role(state, task.station_id, user_id).await?;
    Ok((task, station, role))
}

fn extract_request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(sanitize_request_id)
        .unwrap_or_else(|| Ulid::new().to_string())
}

fn sanitize_request_id(raw: &str) -> Option<String> {
    const MAX_LEN: usize = 64;
    let mut out = String::with_capacity(raw.len().min(MAX_LEN));

    for ch in raw.chars() {
        if out.len() == MAX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        }
    }

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_sanitized_and_capped() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", "abc-123_DEF!!".parse().unwrap());
        assert_eq!(extract_request_id(&headers), "abc-123_DEF");

        let long = "x".repeat(200);
        headers.insert("x-request-id", long.parse().unwrap());
        assert_eq!(extract_request_id(&headers).len(), 64);
    }

    #[test]
    fn blank_request_id_falls_back_to_a_ulid() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", "   ".parse().unwrap());
        assert_eq!(extract_request_id(&headers).len(), 26);
    }

    #[test]
    fn role_gate_follows_the_hierarchy() {
        assert!(require_role(Role::Owner, Role::Admin).is_ok());
        assert!(require_role(Role::Admin, Role::Admin).is_ok());
        assert!(require_role(Role::Leader, Role::Admin).is_err());
        assert!(require_role(Role::Member, Role::Leader).is_err());
    }
}
