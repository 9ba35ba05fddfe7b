use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use orbitask_domain::Comment;
use orbitask_store::{CommentDetail, CommentWithUser};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    authenticate, forbidden, not_found, station_role, store_error, task_role, validation_error,
    ApiError, AppState,
};

fn validate_content(content: &str) -> Result<&str, ApiError> {
    let content = content.trim();
    if content.is_empty() || content.len() > 1000 {
        return Err(validation_error("content must be 1 to 1000 characters"));
    }
    Ok(content)
}

/// Edits and deletes are author-only, regardless of station role.
async fn authored_comment(
    state: &AppState,
    comment_id: Uuid,
    user_id: Uuid,
) -> Result<CommentDetail, ApiError> {
    let detail = state
        .store
        .find_comment(comment_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("comment not found"))?;

    station_role(state, detail.station_id, user_id).await?;

    if detail.comment.user_id != user_id {
        return Err(forbidden("only the comment author can modify it"));
    }
    Ok(detail)
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    content: String,
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    message: &'static str,
    comment: CommentWithUser,
}

pub async fn add(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
    req: Result<Json<CommentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CommentResponse>), ApiError> {
    let claims = authenticate(&state, &headers)?;
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;
    let content = validate_content(&req.content)?;

    task_role(&state, task_id, claims.sub).await?;

    let comment = state
        .store
        .add_comment(task_id, claims.sub, content)
        .await
        .map_err(store_error)?;

    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            message: "comment added",
            comment,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct CommentListResponse {
    message: String,
    comments: Vec<CommentWithUser>,
}

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
) -> Result<Json<CommentListResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    task_role(&state, task_id, claims.sub).await?;

    let comments = state
        .store
        .comments_for_task(task_id)
        .await
        .map_err(store_error)?;

    Ok(Json(CommentListResponse {
        message: format!("{} comment(s) found", comments.len()),
        comments,
    }))
}

#[derive(Debug, Serialize)]
pub struct UpdatedCommentResponse {
    message: &'static str,
    comment: Comment,
}

pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    req: Result<Json<CommentRequest>, JsonRejection>,
) -> Result<Json<UpdatedCommentResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;
    let content = validate_content(&req.content)?;

    authored_comment(&state, id, claims.sub).await?;

    let comment = state
        .store
        .update_comment(id, content)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("comment not found"))?;

    Ok(Json(UpdatedCommentResponse {
        message: "comment updated",
        comment,
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
    authored_comment(&state, id, claims.sub).await?;

    let deleted = state.store.delete_comment(id).await.map_err(store_error)?;
    if !deleted {
        return Err(not_found("comment not found"));
    }

    Ok(Json(DeletedResponse {
        message: "comment deleted",
    }))
}
