use std::collections::HashMap;

use chrono::{DateTime, Utc};
use orbitask_domain::{templates::BoardTemplate, Board, BoardList, TaskPriority, TaskStatus};
use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

use crate::{decode, Store, StoreError};

#[derive(Debug, Clone, Serialize)]
pub struct ListSummary {
    pub id: Uuid,
    pub name: String,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardWithLists {
    #[serde(flatten)]
    pub board: Board,
    pub lists: Vec<ListSummary>,
}

/// Task shape embedded in board snapshots: enough for a card, not the full row.
#[derive(Debug, Clone, Serialize)]
pub struct TaskCard {
    pub id: Uuid,
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub position: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListWithTasks {
    pub id: Uuid,
    pub name: String,
    pub position: i32,
    pub tasks: Vec<TaskCard>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardDetail {
    #[serde(flatten)]
    pub board: Board,
    pub lists: Vec<ListWithTasks>,
}

pub(crate) fn map_board(row: &sqlx::postgres::PgRow) -> Result<Board, StoreError> {
    Ok(Board {
        id: row.try_get("id")?,
        station_id: row.try_get("station_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        color: row.try_get("color")?,
        template_type: decode::template(row.try_get::<String, _>("template_type")?.as_str())?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const BOARD_COLUMNS: &str =
    "id, station_id, name, description, color, template_type, created_by, created_at, updated_at";

impl Store {
    /// Creates the board and instantiates its template lists at positions
    /// `0..k` in one transaction.
    pub async fn create_board(
        &self,
        station_id: Uuid,
        created_by: Uuid,
        name: &str,
        description: Option<&str>,
        color: Option<&str>,
        template: BoardTemplate,
    ) -> Result<(Board, Vec<BoardList>), StoreError> {
        let board_id = Uuid::new_v4();

        let (board_row, list_rows) = tokio::time::timeout(self.write_timeout(), async {
            let mut tx = self.pool().begin().await?;

            let board_row = sqlx::query(&format!(
                "INSERT INTO boards (id, station_id, name, description, color, template_type, created_by) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {BOARD_COLUMNS}"
            ))
            .bind(board_id)
            .bind(station_id)
            .bind(name)
            .bind(description)
            .bind(color)
            .bind(template.as_str())
            .bind(created_by)
            .fetch_one(&mut *tx)
            .await?;

            let mut list_rows = Vec::new();
            for (position, list_name) in template.list_names().iter().enumerate() {
                let row = sqlx::query(
                    "INSERT INTO lists (id, board_id, name, position) VALUES ($1, $2, $3, $4) \
                     RETURNING id, board_id, name, position, created_at, updated_at",
                )
                .bind(Uuid::new_v4())
                .bind(board_id)
                .bind(list_name)
                .bind(position as i32)
                .fetch_one(&mut *tx)
                .await?;
                list_rows.push(row);
            }

            tx.commit().await?;
            Ok::<_, sqlx::Error>((board_row, list_rows))
        })
        .await
        .map_err(|_| StoreError::Timeout)??;

        let board = map_board(&board_row)?;
        let lists = list_rows
            .iter()
            .map(crate::lists::map_list)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((board, lists))
    }

    pub async fn boards_for_station(
        &self,
        station_id: Uuid,
    ) -> Result<Vec<BoardWithLists>, StoreError> {
        let board_rows = sqlx::query(&format!(
            "SELECT {BOARD_COLUMNS} FROM boards WHERE station_id = $1 ORDER BY created_at DESC"
        ))
        .bind(station_id)
        .fetch_all(self.pool())
        .await?;

        let boards = board_rows
            .iter()
            .map(map_board)
            .collect::<Result<Vec<_>, _>>()?;
        let board_ids: Vec<Uuid> = boards.iter().map(|b| b.id).collect();

        let list_rows = sqlx::query(
            "SELECT id, board_id, name, position FROM lists \
             WHERE board_id = ANY($1) ORDER BY position ASC",
        )
        .bind(&board_ids)
        .fetch_all(self.pool())
        .await?;

        let mut lists_by_board: HashMap<Uuid, Vec<ListSummary>> = HashMap::new();
        for row in &list_rows {
            let board_id: Uuid = row.try_get("board_id")?;
            lists_by_board.entry(board_id).or_default().push(ListSummary {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                position: row.try_get("position")?,
            });
        }

        Ok(boards
            .into_iter()
            .map(|board| {
                let lists = lists_by_board.remove(&board.id).unwrap_or_default();
                BoardWithLists { board, lists }
            })
            .collect())
    }

    pub async fn find_board(&self, id: Uuid) -> Result<Option<Board>, StoreError> {
        let row = sqlx::query(&format!("SELECT {BOARD_COLUMNS} FROM boards WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        row.as_ref().map(map_board).transpose()
    }

    /// Full nested snapshot: lists in position order, each with its task cards
    /// in position order.
    pub async fn board_detail(&self, id: Uuid) -> Result<Option<BoardDetail>, StoreError> {
        let Some(board) = self.find_board(id).await? else {
            return Ok(None);
        };

        let list_rows = sqlx::query(
            "SELECT id, name, position FROM lists WHERE board_id = $1 ORDER BY position ASC",
        )
        .bind(id)
        .fetch_all(self.pool())
        .await?;

        let task_rows = sqlx::query(
            "SELECT t.id, t.list_id, t.title, t.status, t.priority, t.position, \
                    t.assigned_to, t.due_date, u.full_name AS assigned_name \
             FROM tasks t \
             JOIN lists l ON l.id = t.list_id \
             LEFT JOIN users u ON u.id = t.assigned_to \
             WHERE l.board_id = $1 ORDER BY t.position ASC",
        )
        .bind(id)
        .fetch_all(self.pool())
        .await?;

        let mut tasks_by_list: HashMap<Uuid, Vec<TaskCard>> = HashMap::new();
        for row in &task_rows {
            let list_id: Uuid = row.try_get("list_id")?;
            tasks_by_list.entry(list_id).or_default().push(TaskCard {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                status: decode::status(row.try_get::<String, _>("status")?.as_str())?,
                priority: decode::priority(row.try_get::<String, _>("priority")?.as_str())?,
                position: row.try_get("position")?,
                assigned_to: row.try_get("assigned_to")?,
                assigned_name: row.try_get("assigned_name")?,
                due_date: row.try_get("due_date")?,
            });
        }

        let mut lists = Vec::with_capacity(list_rows.len());
        for row in &list_rows {
            let list_id: Uuid = row.try_get("id")?;
            lists.push(ListWithTasks {
                id: list_id,
                name: row.try_get("name")?,
                position: row.try_get("position")?,
                tasks: tasks_by_list.remove(&list_id).unwrap_or_default(),
            });
        }

        Ok(Some(BoardDetail { board, lists }))
    }

    pub async fn update_board(
        &self,
        id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
        color: Option<&str>,
    ) -> Result<Option<Board>, StoreError> {
        let row = tokio::time::timeout(
            self.write_timeout(),
            sqlx::query(&format!(
                "UPDATE boards SET name = COALESCE($2, name), \
                        description = COALESCE($3, description), \
                        color = COALESCE($4, color), updated_at = now() \
                 WHERE id = $1 RETURNING {BOARD_COLUMNS}"
            ))
            .bind(id)
            .bind(name)
            .bind(description)
            .bind(color)
            .fetch_optional(self.pool()),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        row.as_ref().map(map_board).transpose()
    }

    /// Lists and tasks go with it via ON DELETE CASCADE.
    pub async fn delete_board(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = tokio::time::timeout(
            self.write_timeout(),
            sqlx::query("DELETE FROM boards WHERE id = $1")
                .bind(id)
                .execute(self.pool()),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_boards(&self, station_id: Uuid) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM boards WHERE station_id = $1")
            .bind(station_id)
            .fetch_one(self.pool())
            .await?;
        Ok(row.try_get("n")?)
    }
}
