use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use orbitask_ai::AiClient;
use orbitask_domain::Role;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::Instrument;
use uuid::Uuid;

use super::{
    authenticate, board_role, extract_request_id, json_error, not_found, require_role,
    station_role, store_error, task_role, validation_error, ApiError, AppState,
};
use crate::context;

const SUGGESTION_QUERY: &str = "Analise os dados desta station e forneça 3-5 sugestões \
     específicas para melhorar: 1. Produtividade da equipe 2. Organização dos projetos \
     3. Gestão de prazos 4. Distribuição de tarefas. Base suas sugestões nos dados reais \
     fornecidos e seja específico sobre o que pode ser melhorado.";

const SUMMARY_QUERY: &str = "Forneça um resumo executivo desta station incluindo: \
     1. Status geral do projeto 2. Principais realizações 3. Próximos passos importantes \
     4. Alertas ou questões que precisam de atenção. Mantenha o resumo conciso mas informativo.";

fn ai_client(state: &AppState) -> Result<&AiClient, ApiError> {
    state.ai.as_ref().ok_or_else(|| {
        json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "ERR_AI_DISABLED",
            "the assistant is not configured on this deployment",
        )
    })
}

fn check_rate(state: &AppState, user_id: Uuid) -> Result<(), ApiError> {
    if !state
        .rate_limiter
        .allow(user_id, state.config.rate_limit_ai_per_window)
    {
        return Err(json_error(
            StatusCode::TOO_MANY_REQUESTS,
            "ERR_RATE_LIMITED",
            "too many assistant requests, slow down",
        ));
    }
    Ok(())
}

fn validate_query(query: &str) -> Result<&str, ApiError> {
    let query = query.trim();
    if query.is_empty() || query.len() > 500 {
        return Err(validation_error("query must be 1 to 500 characters"));
    }
    Ok(query)
}

fn array_len(value: &Value, key: &str) -> usize {
    value[key].as_array().map(Vec::len).unwrap_or(0)
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    query: String,
}

pub async fn ask_station(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(station_id): Path<Uuid>,
    req: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;
    let query = validate_query(&req.query)?.to_string();

    let client = ai_client(&state)?.clone();
    check_rate(&state, claims.sub)?;

    let (station, _) = station_role(&state, station_id, claims.sub).await?;

    let request_id = extract_request_id(&headers);
    let span = tracing::info_span!(
        "ai.ask_station",
        request_id = %request_id,
        user_id = %claims.sub,
        station_id = %station_id,
        query_len = query.len(),
    );

    async {
        let context = context::station_context(&state.store, &station, claims.sub)
            .await
            .map_err(store_error)?;

        let answer = client.ask(&query, &context).await;
        state.metrics.observe_ai_request(
            "station",
            if answer.is_fallback() { "fallback" } else { "answered" },
        );

        Ok(Json(json!({
            "message": "question answered",
            "query": query,
            "response": answer.response,
            "context": {
                "type": "station",
                "station_name": station.name,
                "data_points": {
                    "members": array_len(&context, "members"),
                    "boards": array_len(&context, "boards"),
                    "tasks": array_len(&context, "tasks"),
                },
            },
            "metadata": answer.metadata,
        })))
    }
    .instrument(span)
    .await
}

pub async fn ask_board(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(board_id): Path<Uuid>,
    req: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;
    let query = validate_query(&req.query)?.to_string();

    let client = ai_client(&state)?.clone();
    check_rate(&state, claims.sub)?;

    let (board, station, _) = board_role(&state, board_id, claims.sub).await?;

    let request_id = extract_request_id(&headers);
    let span = tracing::info_span!(
        "ai.ask_board",
        request_id = %request_id,
        user_id = %claims.sub,
        board_id = %board_id,
        query_len = query.len(),
    );

    async {
        let context = context::board_context(&state.store, board_id, &station.name, claims.sub)
            .await
            .map_err(store_error)?
            .ok_or_else(|| not_found("board not found"))?;

        let answer = client.ask(&query, &context).await;
        state.metrics.observe_ai_request(
            "board",
            if answer.is_fallback() { "fallback" } else { "answered" },
        );

        Ok(Json(json!({
            "message": "question answered",
            "query": query,
            "response": answer.response,
            "context": {
                "type": "board",
                "board_name": board.name,
                "station_name": station.name,
                "data_points": {
                    "lists": array_len(&context, "lists"),
                    "tasks": array_len(&context, "tasks"),
                },
            },
            "metadata": answer.metadata,
        })))
    }
    .instrument(span)
    .await
}

pub async fn ask_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
    req: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;
    let query = validate_query(&req.query)?.to_string();

    let client = ai_client(&state)?.clone();
    check_rate(&state, claims.sub)?;

    let (task, station, _) = task_role(&state, task_id, claims.sub).await?;

    let request_id = extract_request_id(&headers);
    let span = tracing::info_span!(
        "ai.ask_task",
        request_id = %request_id,
        user_id = %claims.sub,
        task_id = %task_id,
        query_len = query.len(),
    );

    async {
        let context = context::task_context(&state.store, &task, &station.name, claims.sub)
            .await
            .map_err(store_error)?;

        let answer = client.ask(&query, &context).await;
        state.metrics.observe_ai_request(
            "task",
            if answer.is_fallback() { "fallback" } else { "answered" },
        );

        Ok(Json(json!({
            "message": "question answered",
            "query": query,
            "response": answer.response,
            "context": {
                "type": "task",
                "task_title": task.task.title,
                "board_name": task.board_name,
                "station_name": station.name,
                "data_points": {
                    "comments": array_len(&context, "comments"),
                    "status": task.task.status,
                    "priority": task.task.priority,
                },
            },
            "metadata": answer.metadata,
        })))
    }
    .instrument(span)
    .await
}

pub async fn station_suggestions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(station_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let claims = authenticate(&state, &headers)?;

    let client = ai_client(&state)?.clone();
    check_rate(&state, claims.sub)?;

    let (station, role) = station_role(&state, station_id, claims.sub).await?;
    require_role(role, Role::Leader)?;

    let context = context::station_context(&state.store, &station, claims.sub)
        .await
        .map_err(store_error)?;

    let answer = client.ask(SUGGESTION_QUERY, &context).await;
    state.metrics.observe_ai_request(
        "suggestions",
        if answer.is_fallback() { "fallback" } else { "answered" },
    );

    let metrics = &context["metrics"];
    Ok(Json(json!({
        "message": "suggestions generated",
        "station_name": station.name,
        "suggestions": answer.response,
        "analysis_based_on": {
            "total_tasks": metrics["total_tasks"],
            "completion_rate": metrics["completion_rate"],
            "overdue_tasks": metrics["overdue_tasks"],
            "unassigned_tasks": metrics["unassigned_tasks"],
            "active_members": metrics["active_members"],
        },
        "metadata": answer.metadata,
    })))
}

pub async fn station_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(station_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let claims = authenticate(&state, &headers)?;

    let client = ai_client(&state)?.clone();
    check_rate(&state, claims.sub)?;

    let (station, _) = station_role(&state, station_id, claims.sub).await?;

    let context = context::station_context(&state.store, &station, claims.sub)
        .await
        .map_err(store_error)?;

    let answer = client.ask(SUMMARY_QUERY, &context).await;
    state.metrics.observe_ai_request(
        "summary",
        if answer.is_fallback() { "fallback" } else { "answered" },
    );

    let metrics = &context["metrics"];
    Ok(Json(json!({
        "message": "summary generated",
        "station_name": station.name,
        "summary": answer.response,
        "key_metrics": {
            "total_tasks": metrics["total_tasks"],
            "completion_rate": format!("{}%", metrics["completion_rate"]),
            "overdue_tasks": metrics["overdue_tasks"],
            "team_size": metrics["active_members"],
        },
        "generated_at": Utc::now(),
        "metadata": answer.metadata,
    })))
}

/// Unauthenticated probe. Reports configuration even when the feature is off.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let (status, healthy) = match state.ai.as_ref() {
        Some(client) => {
            if client.health().await {
                (StatusCode::OK, "healthy")
            } else {
                (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
            }
        }
        None => (StatusCode::SERVICE_UNAVAILABLE, "disabled"),
    };

    (
        status,
        Json(json!({
            "service": "Orbit AI",
            "status": healthy,
            "api_configured": state.config.ai_enabled(),
            "feature_enabled": state.config.ai_enabled(),
            "timestamp": Utc::now(),
        })),
    )
}
