use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use orbitask_domain::{Role, Task, TaskPriority, TaskStatus};
use orbitask_store::{CommentWithUser, NewTask, TaskDetail, TaskFilters, TaskOverview, TaskUpdate};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use super::{
    authenticate, board_role, extract_request_id, not_found, require_role, store_error, task_role,
    validation_error, ApiError, AppState,
};

fn validate_title(title: &str) -> Result<&str, ApiError> {
    let title = title.trim();
    if title.is_empty() || title.len() > 200 {
        return Err(validation_error("title must be 1 to 200 characters"));
    }
    Ok(title)
}

/// Assignments only ever point at station members.
async fn ensure_member(
    state: &AppState,
    station_id: Uuid,
    user_id: Uuid,
) -> Result<(), ApiError> {
    let member = state
        .store
        .find_member(station_id, user_id)
        .await
        .map_err(store_error)?;
    if member.is_none() {
        return Err(validation_error(
            "the assignee must be a member of the station",
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<TaskStatus>,
    #[serde(default)]
    priority: Option<TaskPriority>,
    #[serde(default)]
    assigned_to: Option<Uuid>,
    #[serde(default)]
    due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    message: &'static str,
    task: Task,
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(list_id): Path<Uuid>,
    req: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    let claims = authenticate(&state, &headers)?;
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;
    let title = validate_title(&req.title)?;

    let list = state
        .store
        .find_list(list_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("list not found"))?;

    let (_, station, _) = board_role(&state, list.board_id, claims.sub).await?;

    if let Some(assignee) = req.assigned_to {
        ensure_member(&state, station.id, assignee).await?;
    }

    let request_id = extract_request_id(&headers);
    let span = tracing::info_span!(
        "task.create",
        request_id = %request_id,
        user_id = %claims.sub,
        list_id = %list_id,
    );

    async {
        let task = state
            .store
            .create_task(
                list_id,
                claims.sub,
                NewTask {
                    title: title.to_string(),
                    description: req.description.clone(),
                    status: req.status,
                    priority: req.priority,
                    assigned_to: req.assigned_to,
                    due_date: req.due_date,
                },
            )
            .await
            .map_err(store_error)?;

        tracing::info!(task_id = %task.id, position = task.position, "task created");

        Ok((
            StatusCode::CREATED,
            Json(TaskResponse {
                message: "task created",
                task,
            }),
        ))
    }
    .instrument(span)
    .await
}

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    #[serde(default)]
    assigned_to: Option<Uuid>,
    #[serde(default)]
    status: Option<TaskStatus>,
    #[serde(default)]
    priority: Option<TaskPriority>,
    #[serde(default)]
    search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    message: String,
    tasks: Vec<TaskOverview>,
}

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(board_id): Path<Uuid>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    board_role(&state, board_id, claims.sub).await?;

    let filters = TaskFilters {
        assigned_to: query.assigned_to,
        status: query.status,
        priority: query.priority,
        search: query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    };

    let tasks = state
        .store
        .tasks_for_board(board_id, &filters)
        .await
        .map_err(store_error)?;

    Ok(Json(TaskListResponse {
        message: format!("{} task(s) found", tasks.len()),
        tasks,
    }))
}

#[derive(Debug, Serialize)]
pub struct TaskDetailResponse {
    task: TaskDetail,
    comments: Vec<CommentWithUser>,
}

pub async fn get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskDetailResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let (task, _, _) = task_role(&state, id, claims.sub).await?;

    let comments = state
        .store
        .comments_for_task(id)
        .await
        .map_err(store_error)?;

    Ok(Json(TaskDetailResponse { task, comments }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<TaskStatus>,
    #[serde(default)]
    priority: Option<TaskPriority>,
    #[serde(default)]
    due_date: Option<DateTime<Utc>>,
}

pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    req: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<TaskResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;

    let title = match req.title.as_deref() {
        Some(raw) => Some(validate_title(raw)?.to_string()),
        None => None,
    };

    task_role(&state, id, claims.sub).await?;

    let task = state
        .store
        .update_task(
            id,
            &TaskUpdate {
                title,
                description: req.description,
                status: req.status,
                priority: req.priority,
                due_date: req.due_date,
            },
        )
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("task not found"))?;

    Ok(Json(TaskResponse {
        message: "task updated",
        task,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AssignTaskRequest {
    // Absent or null clears the assignment.
    #[serde(default)]
    user_id: Option<Uuid>,
}

pub async fn assign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    req: Result<Json<AssignTaskRequest>, JsonRejection>,
) -> Result<Json<TaskResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;

    let (_, station, role) = task_role(&state, id, claims.sub).await?;
    require_role(role, Role::Leader)?;

    if let Some(assignee) = req.user_id {
        ensure_member(&state, station.id, assignee).await?;
    }

    let task = state
        .store
        .assign_task(id, req.user_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("task not found"))?;

    let message = if req.user_id.is_some() {
        "task assigned"
    } else {
        "task unassigned"
    };

    Ok(Json(TaskResponse { message, task }))
}

#[derive(Debug, Deserialize)]
pub struct MoveTaskRequest {
    list_id: Uuid,
    #[serde(default)]
    position: Option<i32>,
}

pub async fn relocate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    req: Result<Json<MoveTaskRequest>, JsonRejection>,
) -> Result<Json<TaskResponse>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let Json(req) = req.map_err(|_| validation_error("invalid JSON body"))?;

    if matches!(req.position, Some(p) if p < 0) {
        return Err(validation_error("position must be >= 0"));
    }

    let (task, _, _) = task_role(&state, id, claims.sub).await?;

    let dest = state
        .store
        .find_list(req.list_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("destination list not found"))?;
    if dest.board_id != task.board_id {
        return Err(validation_error(
            "a task can only move between lists on the same board",
        ));
    }

    let request_id = extract_request_id(&headers);
    let span = tracing::info_span!(
        "task.move",
        request_id = %request_id,
        user_id = %claims.sub,
        task_id = %id,
        dest_list = %req.list_id,
    );

    async {
        let task = state
            .store
            .move_task(id, req.list_id, req.position)
            .await
            .map_err(store_error)?;

        tracing::info!(final_position = task.position, "task moved");

        Ok(Json(TaskResponse {
            message: "task moved",
            task,
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
    task_role(&state, id, claims.sub).await?;

    let deleted = state.store.delete_task(id).await.map_err(store_error)?;
    if !deleted {
        return Err(not_found("task not found"));
    }

    Ok(Json(DeletedResponse {
        message: "task deleted",
    }))
}
