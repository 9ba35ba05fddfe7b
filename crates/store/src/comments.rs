use orbitask_domain::{Comment, UserSummary};
use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

use crate::users::map_user_summary;
use crate::{Store, StoreError};

#[derive(Debug, Clone, Serialize)]
pub struct CommentWithUser {
    #[serde(flatten)]
    pub comment: Comment,
    pub user: UserSummary,
}

/// Comment joined up to its station, so handlers can authorize the caller
/// without extra lookups.
#[derive(Debug, Clone)]
pub struct CommentDetail {
    pub comment: Comment,
    pub station_id: Uuid,
}

const COMMENT_COLUMNS: &str = "c.id, c.task_id, c.user_id, c.content, c.created_at, c.updated_at";

fn map_comment(row: &sqlx::postgres::PgRow) -> Result<Comment, StoreError> {
    Ok(Comment {
        id: row.try_get("id")?,
        task_id: row.try_get("task_id")?,
        user_id: row.try_get("user_id")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl Store {
    pub async fn add_comment(
        &self,
        task_id: Uuid,
        user_id: Uuid,
        content: &str,
    ) -> Result<CommentWithUser, StoreError> {
        let row = tokio::time::timeout(
            self.write_timeout(),
            sqlx::query(&format!(
                "WITH c AS (\
                     INSERT INTO task_comments (id, task_id, user_id, content) \
                     VALUES ($1, $2, $3, $4) RETURNING id, task_id, user_id, content, \
                            created_at, updated_at\
                 ) \
                 SELECT {COMMENT_COLUMNS}, u.id AS author_id, u.email AS author_email, \
                        u.full_name AS author_full_name \
                 FROM c JOIN users u ON u.id = c.user_id"
            ))
            .bind(Uuid::new_v4())
            .bind(task_id)
            .bind(user_id)
            .bind(content)
            .fetch_one(self.pool()),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(CommentWithUser {
            comment: map_comment(&row)?,
            user: map_user_summary(&row, "author_")?,
        })
    }

    /// Oldest first, the order a thread reads in.
    pub async fn comments_for_task(
        &self,
        task_id: Uuid,
    ) -> Result<Vec<CommentWithUser>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS}, u.id AS author_id, u.email AS author_email, \
                    u.full_name AS author_full_name \
             FROM task_comments c JOIN users u ON u.id = c.user_id \
             WHERE c.task_id = $1 ORDER BY c.created_at ASC"
        ))
        .bind(task_id)
        .fetch_all(self.pool())
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(CommentWithUser {
                comment: map_comment(row)?,
                user: map_user_summary(row, "author_")?,
            });
        }
        Ok(out)
    }

    pub async fn find_comment(&self, id: Uuid) -> Result<Option<CommentDetail>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS}, b.station_id AS station_id \
             FROM task_comments c \
             JOIN tasks t ON t.id = c.task_id \
             JOIN lists l ON l.id = t.list_id \
             JOIN boards b ON b.id = l.board_id \
             WHERE c.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(CommentDetail {
            comment: map_comment(&row)?,
            station_id: row.try_get("station_id")?,
        }))
    }

    pub async fn update_comment(
        &self,
        id: Uuid,
        content: &str,
    ) -> Result<Option<Comment>, StoreError> {
        let row = tokio::time::timeout(
            self.write_timeout(),
            sqlx::query(
                "UPDATE task_comments SET content = $2, updated_at = now() WHERE id = $1 \
                 RETURNING id, task_id, user_id, content, created_at, updated_at",
            )
            .bind(id)
            .bind(content)
            .fetch_optional(self.pool()),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        row.as_ref().map(map_comment).transpose()
    }

    pub async fn delete_comment(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = tokio::time::timeout(
            self.write_timeout(),
            sqlx::query("DELETE FROM task_comments WHERE id = $1")
                .bind(id)
                .execute(self.pool()),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(result.rows_affected() > 0)
    }
}
