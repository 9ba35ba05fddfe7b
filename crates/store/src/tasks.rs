use chrono::{DateTime, Utc};
use orbitask_domain::{Task, TaskPriority, TaskStatus};
use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

use crate::lists::{clamp_target, plan_shift, Shift};
use crate::{decode, Store, StoreError};

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Patch semantics: `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilters {
    pub assigned_to: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub search: Option<String>,
}

/// Flat row for board-wide task listings, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOverview {
    #[serde(flatten)]
    pub task: Task,
    pub list_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_name: Option<String>,
    pub created_by_name: String,
}

/// Single task joined up to its board and station, enough for the detail
/// endpoint and for access checks without a second round trip.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub list_name: String,
    pub board_id: Uuid,
    pub board_name: String,
    pub station_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_name: Option<String>,
    pub created_by_name: String,
}

const TASK_COLUMNS: &str = "id, list_id, title, description, status, priority, position, \
     assigned_to, due_date, created_by, created_at, updated_at";

fn map_task(row: &sqlx::postgres::PgRow) -> Result<Task, StoreError> {
    Ok(Task {
        id: row.try_get("id")?,
        list_id: row.try_get("list_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: decode::status(row.try_get::<String, _>("status")?.as_str())?,
        priority: decode::priority(row.try_get::<String, _>("priority")?.as_str())?,
        position: row.try_get("position")?,
        assigned_to: row.try_get("assigned_to")?,
        due_date: row.try_get("due_date")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_task_prefixed(row: &sqlx::postgres::PgRow) -> Result<Task, StoreError> {
    Ok(Task {
        id: row.try_get("t_id")?,
        list_id: row.try_get("t_list_id")?,
        title: row.try_get("t_title")?,
        description: row.try_get("t_description")?,
        status: decode::status(row.try_get::<String, _>("t_status")?.as_str())?,
        priority: decode::priority(row.try_get::<String, _>("t_priority")?.as_str())?,
        position: row.try_get("t_position")?,
        assigned_to: row.try_get("t_assigned_to")?,
        due_date: row.try_get("t_due_date")?,
        created_by: row.try_get("t_created_by")?,
        created_at: row.try_get("t_created_at")?,
        updated_at: row.try_get("t_updated_at")?,
    })
}

const TASK_JOIN_COLUMNS: &str = "t.id AS t_id, t.list_id AS t_list_id, t.title AS t_title, \
     t.description AS t_description, t.status AS t_status, t.priority AS t_priority, \
     t.position AS t_position, t.assigned_to AS t_assigned_to, t.due_date AS t_due_date, \
     t.created_by AS t_created_by, t.created_at AS t_created_at, t.updated_at AS t_updated_at, \
     l.name AS list_name, a.full_name AS assigned_name, c.full_name AS created_by_name";

impl Store {
    /// Appends at the tail of the list. The list row is locked so concurrent
    /// creates cannot mint the same position.
    pub async fn create_task(
        &self,
        list_id: Uuid,
        created_by: Uuid,
        task: NewTask,
    ) -> Result<Task, StoreError> {
        let status = task.status.unwrap_or_default();
        let priority = task.priority.unwrap_or_default();

        let row = tokio::time::timeout(self.write_timeout(), async {
            let mut tx = self.pool().begin().await?;

            sqlx::query("SELECT id FROM lists WHERE id = $1 FOR UPDATE")
                .bind(list_id)
                .fetch_one(&mut *tx)
                .await?;

            let next: i32 = sqlx::query(
                "SELECT COALESCE(MAX(position) + 1, 0) AS next FROM tasks WHERE list_id = $1",
            )
            .bind(list_id)
            .fetch_one(&mut *tx)
            .await?
            .try_get("next")?;

            let row = sqlx::query(&format!(
                "INSERT INTO tasks (id, list_id, title, description, status, priority, position, \
                        assigned_to, due_date, created_by) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {TASK_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(list_id)
            .bind(task.title.as_str())
            .bind(task.description.as_deref())
            .bind(status.as_str())
            .bind(priority.as_str())
            .bind(next)
            .bind(task.assigned_to)
            .bind(task.due_date)
            .bind(created_by)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>(row)
        })
        .await
        .map_err(|_| StoreError::Timeout)??;

        map_task(&row)
    }

    /// All tasks on a board, filtered, newest first.
    pub async fn tasks_for_board(
        &self,
        board_id: Uuid,
        filters: &TaskFilters,
    ) -> Result<Vec<TaskOverview>, StoreError> {
        let mut sql = format!(
            "SELECT {TASK_JOIN_COLUMNS} FROM tasks t \
             JOIN lists l ON l.id = t.list_id \
             LEFT JOIN users a ON a.id = t.assigned_to \
             JOIN users c ON c.id = t.created_by \
             WHERE l.board_id = $1"
        );

        // Conditional binds keep their ordinal in sync with the clause list.
        let mut ordinal = 1;
        if filters.assigned_to.is_some() {
            ordinal += 1;
            sql.push_str(&format!(" AND t.assigned_to = ${ordinal}"));
        }
        if filters.status.is_some() {
            ordinal += 1;
            sql.push_str(&format!(" AND t.status = ${ordinal}"));
        }
        if filters.priority.is_some() {
            ordinal += 1;
            sql.push_str(&format!(" AND t.priority = ${ordinal}"));
        }
        if filters.search.is_some() {
            ordinal += 1;
            sql.push_str(&format!(
                " AND (t.title ILIKE ${ordinal} OR t.description ILIKE ${ordinal})"
            ));
        }
        sql.push_str(" ORDER BY t.created_at DESC");

        let mut query = sqlx::query(&sql).bind(board_id);
        if let Some(user_id) = filters.assigned_to {
            query = query.bind(user_id);
        }
        if let Some(status) = filters.status {
            query = query.bind(status.as_str());
        }
        if let Some(priority) = filters.priority {
            query = query.bind(priority.as_str());
        }
        if let Some(search) = &filters.search {
            query = query.bind(format!("%{search}%"));
        }

        let rows = query.fetch_all(self.pool()).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(TaskOverview {
                task: map_task_prefixed(row)?,
                list_name: row.try_get("list_name")?,
                assigned_name: row.try_get("assigned_name")?,
                created_by_name: row.try_get("created_by_name")?,
            });
        }
        Ok(out)
    }

    pub async fn find_task(&self, id: Uuid) -> Result<Option<TaskDetail>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_JOIN_COLUMNS}, b.id AS board_id, b.name AS board_name, \
                    b.station_id AS station_id \
             FROM tasks t \
             JOIN lists l ON l.id = t.list_id \
             JOIN boards b ON b.id = l.board_id \
             LEFT JOIN users a ON a.id = t.assigned_to \
             JOIN users c ON c.id = t.created_by \
             WHERE t.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(TaskDetail {
            task: map_task_prefixed(&row)?,
            list_name: row.try_get("list_name")?,
            board_id: row.try_get("board_id")?,
            board_name: row.try_get("board_name")?,
            station_id: row.try_get("station_id")?,
            assigned_name: row.try_get("assigned_name")?,
            created_by_name: row.try_get("created_by_name")?,
        }))
    }

    pub async fn update_task(
        &self,
        id: Uuid,
        update: &TaskUpdate,
    ) -> Result<Option<Task>, StoreError> {
        let row = tokio::time::timeout(
            self.write_timeout(),
            sqlx::query(&format!(
                "UPDATE tasks SET title = COALESCE($2, title), \
                        description = COALESCE($3, description), \
                        status = COALESCE($4, status), \
                        priority = COALESCE($5, priority), \
                        due_date = COALESCE($6, due_date), updated_at = now() \
                 WHERE id = $1 RETURNING {TASK_COLUMNS}"
            ))
            .bind(id)
            .bind(update.title.as_deref())
            .bind(update.description.as_deref())
            .bind(update.status.map(|s| s.as_str()))
            .bind(update.priority.map(|p| p.as_str()))
            .bind(update.due_date)
            .fetch_optional(self.pool()),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        row.as_ref().map(map_task).transpose()
    }

    /// `None` clears the assignment.
    pub async fn assign_task(
        &self,
        id: Uuid,
        assigned_to: Option<Uuid>,
    ) -> Result<Option<Task>, StoreError> {
        let row = tokio::time::timeout(
            self.write_timeout(),
            sqlx::query(&format!(
                "UPDATE tasks SET assigned_to = $2, updated_at = now() \
                 WHERE id = $1 RETURNING {TASK_COLUMNS}"
            ))
            .bind(id)
            .bind(assigned_to)
            .fetch_optional(self.pool()),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        row.as_ref().map(map_task).transpose()
    }

    /// Moves a task to `dest_list` at `requested` (append when omitted) in one
    /// transaction. A same-list move is a plain reorder; a cross-list move
    /// opens a slot in the destination and compacts the origin so both lists
    /// stay dense. The destination's board row is locked before anything else,
    /// so concurrent moves on the board serialize instead of deadlocking on
    /// each other's sibling rows.
    pub async fn move_task(
        &self,
        id: Uuid,
        dest_list: Uuid,
        requested: Option<i32>,
    ) -> Result<Task, StoreError> {
        let row = tokio::time::timeout(self.write_timeout(), async {
            let mut tx = self.pool().begin().await?;

            // Board lock doubles as the destination existence check.
            sqlx::query(
                "SELECT b.id FROM boards b JOIN lists l ON l.board_id = b.id \
                 WHERE l.id = $1 FOR UPDATE OF b",
            )
            .bind(dest_list)
            .fetch_one(&mut *tx)
            .await?;

            let current = sqlx::query("SELECT list_id, position FROM tasks WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(sqlx::Error::RowNotFound)?;

            let old_list: Uuid = current.try_get("list_id")?;
            let old: i32 = current.try_get("position")?;

            // Serializes against appends, which take the list row lock.
            sqlx::query("SELECT id FROM lists WHERE id = $1 FOR UPDATE")
                .bind(dest_list)
                .fetch_one(&mut *tx)
                .await?;

            let dest_count: i64 =
                sqlx::query("SELECT COUNT(*) AS n FROM tasks WHERE list_id = $1")
                    .bind(dest_list)
                    .fetch_one(&mut *tx)
                    .await?
                    .try_get("n")?;

            let target = if dest_list == old_list {
                clamp_target(requested.unwrap_or(old), dest_count)
            } else {
                // The moved task is not part of the destination count yet, so
                // the first free slot is `dest_count` itself.
                requested
                    .map(|p| p.clamp(0, dest_count as i32))
                    .unwrap_or(dest_count as i32)
            };

            if dest_list == old_list {
                match plan_shift(old, target) {
                    Shift::None => {
                        // Already in the requested slot: no writes, current state back.
                        let row =
                            sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
                                .bind(id)
                                .fetch_one(&mut *tx)
                                .await?;
                        tx.commit().await?;
                        return Ok::<_, sqlx::Error>(row);
                    }
                    Shift::Down { lo_excl, hi_incl } => {
                        sqlx::query(
                            "UPDATE tasks SET position = position - 1 \
                             WHERE list_id = $1 AND id <> $2 AND position > $3 AND position <= $4",
                        )
                        .bind(old_list)
                        .bind(id)
                        .bind(lo_excl)
                        .bind(hi_incl)
                        .execute(&mut *tx)
                        .await?;
                    }
                    Shift::Up { lo_incl, hi_excl } => {
                        sqlx::query(
                            "UPDATE tasks SET position = position + 1 \
                             WHERE list_id = $1 AND id <> $2 AND position >= $3 AND position < $4",
                        )
                        .bind(old_list)
                        .bind(id)
                        .bind(lo_incl)
                        .bind(hi_excl)
                        .execute(&mut *tx)
                        .await?;
                    }
                }
            } else {
                sqlx::query(
                    "UPDATE tasks SET position = position + 1 \
                     WHERE list_id = $1 AND position >= $2",
                )
                .bind(dest_list)
                .bind(target)
                .execute(&mut *tx)
                .await?;

                // Close the gap the task leaves behind.
                sqlx::query(
                    "UPDATE tasks SET position = position - 1 \
                     WHERE list_id = $1 AND position > $2",
                )
                .bind(old_list)
                .bind(old)
                .execute(&mut *tx)
                .await?;
            }

            let row = sqlx::query(&format!(
                "UPDATE tasks SET list_id = $2, position = $3, updated_at = now() \
                 WHERE id = $1 RETURNING {TASK_COLUMNS}"
            ))
            .bind(id)
            .bind(dest_list)
            .bind(target)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>(row)
        })
        .await
        .map_err(|_| StoreError::Timeout)??;

        map_task(&row)
    }

    /// Deletes the task and compacts its list.
    pub async fn delete_task(&self, id: Uuid) -> Result<bool, StoreError> {
        let deleted = tokio::time::timeout(self.write_timeout(), async {
            let mut tx = self.pool().begin().await?;

            // Same board-first lock order as the move path.
            let Some(_) = sqlx::query(
                "SELECT b.id FROM boards b \
                 JOIN lists l ON l.board_id = b.id \
                 JOIN tasks t ON t.list_id = l.id \
                 WHERE t.id = $1 FOR UPDATE OF b",
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            else {
                return Ok::<_, sqlx::Error>(false);
            };

            let Some(current) =
                sqlx::query("SELECT list_id, position FROM tasks WHERE id = $1 FOR UPDATE")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?
            else {
                return Ok::<_, sqlx::Error>(false);
            };

            let list_id: Uuid = current.try_get("list_id")?;
            let old: i32 = current.try_get("position")?;

            sqlx::query("DELETE FROM tasks WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                "UPDATE tasks SET position = position - 1 WHERE list_id = $1 AND position > $2",
            )
            .bind(list_id)
            .bind(old)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(true)
        })
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(deleted)
    }
}
