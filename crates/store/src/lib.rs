use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

mod boards;
mod comments;
mod lists;
mod members;
mod stations;
mod tasks;
mod users;

pub use boards::{BoardDetail, BoardWithLists, ListSummary, ListWithTasks, TaskCard};
pub use comments::{CommentDetail, CommentWithUser};
pub use members::MemberRecord;
pub use stations::{StationAccess, StationWithRole};
pub use tasks::{NewTask, TaskDetail, TaskFilters, TaskOverview, TaskUpdate};
pub use users::UserCredentials;

#[derive(Debug)]
pub enum StoreError {
    Timeout,
    NotFound,
    Decode(&'static str),
    Sqlx(sqlx::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Timeout => write!(f, "store operation timed out"),
            StoreError::NotFound => write!(f, "row not found"),
            StoreError::Decode(column) => write!(f, "unexpected value in column `{}`", column),
            StoreError::Sqlx(err) => write!(f, "store sql error: {}", err),
        }
    }
}

impl StoreError {
    /// Unique-index conflicts surface as their own HTTP status upstream.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Sqlx(sqlx::Error::Database(db)) => db.code().as_deref() == Some("23505"),
            _ => false,
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Sqlx(other),
        }
    }
}

/// Postgres-backed persistence accessor. Every entity module hangs its queries
/// off this handle; mutations are bounded by `write_timeout`.
#[derive(Clone)]
pub struct Store {
    pool: sqlx::PgPool,
    write_timeout: Duration,
}

impl Store {
    pub async fn connect(db_url: &str, write_timeout: Duration) -> Result<Self, StoreError> {
        let pool = tokio::time::timeout(
            Duration::from_secs(5),
            PgPoolOptions::new().max_connections(8).connect(db_url),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(Self {
            pool,
            write_timeout,
        })
    }

    pub async fn connect_and_migrate(
        db_url: &str,
        write_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let store = Self::connect(db_url, write_timeout).await?;
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        tokio::time::timeout(Duration::from_secs(10), migrate(&self.pool))
            .await
            .map_err(|_| StoreError::Timeout)?
            .map_err(StoreError::Sqlx)?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub(crate) fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }

    pub(crate) fn write_timeout(&self) -> Duration {
        self.write_timeout
    }
}

pub async fn migrate(pool: &sqlx::PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub(crate) mod decode {
    use orbitask_domain::{templates::BoardTemplate, Role, TaskPriority, TaskStatus};

    use crate::StoreError;

    pub fn role(raw: &str) -> Result<Role, StoreError> {
        Role::parse(raw).ok_or(StoreError::Decode("role"))
    }

    pub fn status(raw: &str) -> Result<TaskStatus, StoreError> {
        TaskStatus::parse(raw).ok_or(StoreError::Decode("status"))
    }

    pub fn priority(raw: &str) -> Result<TaskPriority, StoreError> {
        TaskPriority::parse(raw).ok_or(StoreError::Decode("priority"))
    }

    pub fn template(raw: &str) -> Result<BoardTemplate, StoreError> {
        BoardTemplate::parse(raw).ok_or(StoreError::Decode("template_type"))
    }
}
