use orbitask_domain::{User, UserSummary};
use sqlx::Row;
use uuid::Uuid;

use crate::{Store, StoreError};

/// Full credential row, only surfaced to the login path.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

fn map_user(row: &sqlx::postgres::PgRow) -> Result<User, StoreError> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        full_name: row.try_get("full_name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn map_user_summary(
    row: &sqlx::postgres::PgRow,
    prefix: &str,
) -> Result<UserSummary, StoreError> {
    Ok(UserSummary {
        id: row.try_get(format!("{prefix}id").as_str())?,
        email: row.try_get(format!("{prefix}email").as_str())?,
        full_name: row.try_get(format!("{prefix}full_name").as_str())?,
    })
}

impl Store {
    pub async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        full_name: &str,
    ) -> Result<User, StoreError> {
        let id = Uuid::new_v4();
        let row = tokio::time::timeout(
            self.write_timeout(),
            sqlx::query(
                "INSERT INTO users (id, email, password_hash, full_name) VALUES ($1, $2, $3, $4) \
                 RETURNING id, email, full_name, created_at, updated_at",
            )
            .bind(id)
            .bind(email)
            .bind(password_hash)
            .bind(full_name.trim())
            .fetch_one(self.pool()),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        map_user(&row)
    }

    pub async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, StoreError> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, full_name, created_at, updated_at \
             FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => Ok(Some(UserCredentials {
                password_hash: row.try_get("password_hash")?,
                user: map_user(&row)?,
            })),
            None => Ok(None),
        }
    }

    pub async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, email, full_name, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(map_user).transpose()
    }
}
