use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use orbitask_domain::templates::{available_templates, BoardTemplate, TemplateInfo};
use orbitask_domain::{Board, BoardList, Role};
use orbitask_store::{BoardDetail, BoardWithLists};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use super::{
    authenticate, board_role, extract_request_id, json_error, not_found, require_role,
    station_role, store_error, validation_error, ApiError, AppState,
};

const MAX_BOARDS_PER_STATION: i64 = 10;

#[derive(Debug, Serialize)]
pub struct TemplatesResponse {
    message: &'static str,
    templates: Vec<TemplateInfo>,
}

/// Public: templates are static catalog data, no session required.
pub async fn templates() -> Json<TemplatesResponse> {
    Json(TemplatesResponse {
        message: "available templates",
        templates: available_templates(),
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateBoardRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    template: Option<BoardTemplate>,
}

#[derive(Debug, Serialize)]
pub struct CreatedBoard {
    #[serde(flatten)]
    board: Board,
    lists: Vec<BoardList>,
}

#[derive(Debug, Serialize)]
pub struct CreateBoardResponse {
    message: &'static str,
    board: CreatedBoard,
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(station_id): Path<Uuid>,
    req: Result<Json<CreateBoardRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateBoardResponse>), ApiError> {
    let claims = authenticate(&state, &headers)?;
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;

    let name = req.name.trim();
    if name.is_empty() || name.len() > 100 {
        return Err(validation_error("name must be 1 to 100 characters"));
    }

    let (_, role) = station_role(&state, station_id, claims.sub).await?;
    require_role(role, Role::Leader)?;

    let request_id = extract_request_id(&headers);
    let span = tracing::info_span!(
        "board.create",
        request_id = %request_id,
        user_id = %claims.sub,
        station_id = %station_id,
    );

    async {
        let count = state
            .store
            .count_boards(station_id)
            .await
            .map_err(store_error)?;
        if count >= MAX_BOARDS_PER_STATION {
            return Err(json_error(
                StatusCode::CONFLICT,
                "ERR_BOARD_LIMIT",
                "this station already has the maximum of 10 boards",
            ));
        }

        let template = req.template.unwrap_or(BoardTemplate::Kanban);
        let (board, lists) = state
            .store
            .create_board(
                station_id,
                claims.sub,
                name,
                req.description.as_deref(),
                req.color.as_deref(),
                template,
            )
            .await
            .map_err(store_error)?;

        tracing::info!(board_id = %board.id, template = template.as_str(), "board created");

        Ok((
            StatusCode::CREATED,
            Json(CreateBoardResponse {
                message: "board created",
                board: CreatedBoard { board, lists },
            }),
        ))
    }
    .instrument(span)
    .await
}

#[derive(Debug, Serialize)]
pub struct BoardListResponse {
    message: String,
    boards: Vec<BoardWithLists>,
}

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(station_id): Path<Uuid>,
) -> Result<Json<BoardListResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    station_role(&state, station_id, claims.sub).await?;

    let boards = state
        .store
        .boards_for_station(station_id)
        .await
        .map_err(store_error)?;

    Ok(Json(BoardListResponse {
        message: format!("{} board(s) found", boards.len()),
        boards,
    }))
}

#[derive(Debug, Serialize)]
pub struct BoardDetailResponse {
    board: BoardDetail,
}

pub async fn get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<BoardDetailResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    board_role(&state, id, claims.sub).await?;

    let board = state
        .store
        .board_detail(id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("board not found"))?;

    Ok(Json(BoardDetailResponse { board }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateBoardRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    color: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BoardResponse {
    message: &'static str,
    board: Board,
}

pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    req: Result<Json<UpdateBoardRequest>, JsonRejection>,
) -> Result<Json<BoardResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;

    if let Some(name) = req.name.as_deref() {
        let name = name.trim();
        if name.is_empty() || name.len() > 100 {
            return Err(validation_error("name must be 1 to 100 characters"));
        }
    }

    let (_, _, role) = board_role(&state, id, claims.sub).await?;
    require_role(role, Role::Leader)?;

    let board = state
        .store
        .update_board(
            id,
            req.name.as_deref().map(str::trim),
            req.description.as_deref(),
            req.color.as_deref(),
        )
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("board not found"))?;

    Ok(Json(BoardResponse {
        message: "board updated",
        board,
    }))
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    message: &'static str,
}

pub async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let (_, _, role) = board_role(&state, id, claims.sub).await?;
    require_role(role, Role::Admin)?;

    let request_id = extract_request_id(&headers);
    let span = tracing::info_span!(
        "board.delete",
        request_id = %request_id,
        user_id = %claims.sub,
        board_id = %id,
    );

    async {
        let deleted = state.store.delete_board(id).await.map_err(store_error)?;
        if !deleted {
            return Err(not_found("board not found"));
        }

        tracing::info!("board deleted");

        Ok(Json(DeletedResponse {
            message: "board deleted",
        }))
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn templates_are_served_without_a_session() {
        let Json(resp) = templates().await;
        assert_eq!(resp.templates.len(), 4);
        assert!(resp.templates.iter().any(|t| t.id == "kanban"));
    }
}
