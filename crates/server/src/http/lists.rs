use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use orbitask_domain::{BoardList, Role};
use orbitask_store::ListWithTasks;
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use super::{
    authenticate, board_role, extract_request_id, not_found, require_role, store_error,
    validation_error, ApiError, AppState,
};

async fn list_gate(
    state: &AppState,
    list_id: Uuid,
    user_id: Uuid,
    min: Role,
) -> Result<BoardList, ApiError> {
    let list = state
        .store
        .find_list(list_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("list not found"))?;

    let (_, _, role) = board_role(state, list.board_id, user_id).await?;
    require_role(role, min)?;
    Ok(list)
}

fn validate_list_name(name: &str) -> Result<&str, ApiError> {
    let name = name.trim();
    if name.is_empty() || name.len() > 100 {
        return Err(validation_error("name must be 1 to 100 characters"));
    }
    Ok(name)
}

#[derive(Debug, Deserialize)]
pub struct CreateListRequest {
    name: String,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    message: &'static str,
    list: BoardList,
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(board_id): Path<Uuid>,
    req: Result<Json<CreateListRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ListResponse>), ApiError> {
    let claims = authenticate(&state, &headers)?;
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;
    let name = validate_list_name(&req.name)?;

    let (_, _, role) = board_role(&state, board_id, claims.sub).await?;
    require_role(role, Role::Leader)?;

    let list = state
        .store
        .create_list(board_id, name)
        .await
        .map_err(store_error)?;

    Ok((
        StatusCode::CREATED,
        Json(ListResponse {
            message: "list created",
            list,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct ListsResponse {
    message: String,
    lists: Vec<ListWithTasks>,
}

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(board_id): Path<Uuid>,
) -> Result<Json<ListsResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    board_role(&state, board_id, claims.sub).await?;

    let lists = state
        .store
        .lists_for_board(board_id)
        .await
        .map_err(store_error)?;

    Ok(Json(ListsResponse {
        message: format!("{} list(s) found", lists.len()),
        lists,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RenameListRequest {
    name: String,
}

pub async fn rename(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    req: Result<Json<RenameListRequest>, JsonRejection>,
) -> Result<Json<ListResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;
    let name = validate_list_name(&req.name)?;

    list_gate(&state, id, claims.sub, Role::Leader).await?;

    let list = state
        .store
        .rename_list(id, name)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("list not found"))?;

    Ok(Json(ListResponse {
        message: "list renamed",
        list,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReorderListRequest {
    position: i32,
}

pub async fn reorder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    req: Result<Json<ReorderListRequest>, JsonRejection>,
) -> Result<Json<ListResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;
    if req.position < 0 {
        return Err(validation_error("position must be >= 0"));
    }

    list_gate(&state, id, claims.sub, Role::Leader).await?;

    let request_id = extract_request_id(&headers);
    let span = tracing::info_span!(
        "list.reorder",
        request_id = %request_id,
        user_id = %claims.sub,
        list_id = %id,
        position = req.position,
    );

    async {
        let list = state
            .store
            .reorder_list(id, req.position)
            .await
            .map_err(store_error)?;

        tracing::info!(final_position = list.position, "list reordered");

        Ok(Json(ListResponse {
            message: "list reordered",
            list,
        }))
    }
    .instrument(span)
    .await
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
    list_gate(&state, id, claims.sub, Role::Leader).await?;

    let deleted = state.store.delete_list(id).await.map_err(store_error)?;
    if !deleted {
        return Err(not_found("list not found"));
    }

    Ok(Json(DeletedResponse {
        message: "list deleted",
    }))
}
