use orbitask_domain::{Role, StationMember};
use sqlx::Row;
use uuid::Uuid;

use crate::users::map_user_summary;
use crate::{decode, Store, StoreError};

pub type MemberRecord = StationMember;

const MEMBER_COLUMNS: &str = "m.station_id, m.role, m.joined_at, \
     u.id AS user_id, u.email AS user_email, u.full_name AS user_full_name";

fn map_member(row: &sqlx::postgres::PgRow) -> Result<MemberRecord, StoreError> {
    Ok(StationMember {
        station_id: row.try_get("station_id")?,
        role: decode::role(row.try_get::<String, _>("role")?.as_str())?,
        joined_at: row.try_get("joined_at")?,
        user: map_user_summary(row, "user_")?,
    })
}

impl Store {
    pub async fn add_member(
        &self,
        station_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<MemberRecord, StoreError> {
        let row = tokio::time::timeout(
            self.write_timeout(),
            sqlx::query(&format!(
                "WITH inserted AS (\
                     INSERT INTO station_members (station_id, user_id, role) \
                     VALUES ($1, $2, $3) RETURNING station_id, user_id, role, joined_at\
                 ) \
                 SELECT {MEMBER_COLUMNS} FROM inserted m JOIN users u ON u.id = m.user_id"
            ))
            .bind(station_id)
            .bind(user_id)
            .bind(role.as_str())
            .fetch_one(self.pool()),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        map_member(&row)
    }

    pub async fn members_of(&self, station_id: Uuid) -> Result<Vec<MemberRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM station_members m \
             JOIN users u ON u.id = m.user_id \
             WHERE m.station_id = $1 ORDER BY m.joined_at ASC"
        ))
        .bind(station_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(map_member).collect()
    }

    pub async fn find_member(
        &self,
        station_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<MemberRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM station_members m \
             JOIN users u ON u.id = m.user_id \
             WHERE m.station_id = $1 AND m.user_id = $2"
        ))
        .bind(station_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(map_member).transpose()
    }

    pub async fn update_member_role(
        &self,
        station_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Option<MemberRecord>, StoreError> {
        let row = tokio::time::timeout(
            self.write_timeout(),
            sqlx::query(&format!(
                "WITH updated AS (\
                     UPDATE station_members SET role = $3 \
                     WHERE station_id = $1 AND user_id = $2 \
                     RETURNING station_id, user_id, role, joined_at\
                 ) \
                 SELECT {MEMBER_COLUMNS} FROM updated m JOIN users u ON u.id = m.user_id"
            ))
            .bind(station_id)
            .bind(user_id)
            .bind(role.as_str())
            .fetch_optional(self.pool()),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        row.as_ref().map(map_member).transpose()
    }

    pub async fn remove_member(&self, station_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let result = tokio::time::timeout(
            self.write_timeout(),
            sqlx::query("DELETE FROM station_members WHERE station_id = $1 AND user_id = $2")
                .bind(station_id)
                .bind(user_id)
                .execute(self.pool()),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_members(&self, station_id: Uuid) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM station_members WHERE station_id = $1")
            .bind(station_id)
            .fetch_one(self.pool())
            .await?;
        Ok(row.try_get("n")?)
    }
}
