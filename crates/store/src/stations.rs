use orbitask_domain::{Role, Station};
use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

use crate::{decode, Store, StoreError};

#[derive(Debug, Clone, Serialize)]
pub struct StationWithRole {
    #[serde(flatten)]
    pub station: Station,
    pub role: Role,
}

/// Result of resolving a caller against a station: the station row plus the
/// caller's role, `None` when the caller is neither owner nor member.
#[derive(Debug, Clone)]
pub struct StationAccess {
    pub station: Station,
    pub role: Option<Role>,
}

fn map_station(row: &sqlx::postgres::PgRow) -> Result<Station, StoreError> {
    Ok(Station {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        owner_id: row.try_get("owner_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

impl Store {
    pub async fn create_station(
        &self,
        name: &str,
        description: Option<&str>,
        owner_id: Uuid,
    ) -> Result<Station, StoreError> {
        let id = Uuid::new_v4();
        let row = tokio::time::timeout(self.write_timeout(), async {
            let mut tx = self.pool().begin().await?;

            let row = sqlx::query(
                "INSERT INTO stations (id, name, description, owner_id) VALUES ($1, $2, $3, $4) \
                 RETURNING id, name, description, owner_id, created_at, updated_at, completed_at",
            )
            .bind(id)
            .bind(name)
            .bind(description)
            .bind(owner_id)
            .fetch_one(&mut *tx)
            .await?;

            // The owner is also materialized in the membership relation so the
            // listing query stays a single join.
            sqlx::query(
                "INSERT INTO station_members (station_id, user_id, role) VALUES ($1, $2, 'owner')",
            )
            .bind(id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>(row)
        })
        .await
        .map_err(|_| StoreError::Timeout)??;

        map_station(&row)
    }

    /// Active stations where the user is owner or member, newest first.
    pub async fn stations_for_user(&self, user_id: Uuid) -> Result<Vec<StationWithRole>, StoreError> {
        let rows = sqlx::query(
            "SELECT s.id, s.name, s.description, s.owner_id, s.created_at, s.updated_at, \
                    s.completed_at, m.role \
             FROM stations s \
             JOIN station_members m ON m.station_id = s.id AND m.user_id = $1 \
             WHERE s.completed_at IS NULL \
             ORDER BY s.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let station = map_station(&row)?;
            let role = if station.owner_id == user_id {
                Role::Owner
            } else {
                decode::role(row.try_get::<String, _>("role")?.as_str())?
            };
            out.push(StationWithRole { station, role });
        }
        Ok(out)
    }

    /// Active station by id; soft-completed stations are invisible.
    pub async fn find_station(&self, id: Uuid) -> Result<Option<Station>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, description, owner_id, created_at, updated_at, completed_at \
             FROM stations WHERE id = $1 AND completed_at IS NULL",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(map_station).transpose()
    }

    /// Owner resolves to `Owner` regardless of the membership row.
    pub async fn station_access(
        &self,
        station_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<StationAccess>, StoreError> {
        let Some(station) = self.find_station(station_id).await? else {
            return Ok(None);
        };

        if station.owner_id == user_id {
            return Ok(Some(StationAccess {
                station,
                role: Some(Role::Owner),
            }));
        }

        let member = self.find_member(station_id, user_id).await?;
        Ok(Some(StationAccess {
            station,
            role: member.map(|m| m.role),
        }))
    }

    pub async fn update_station(
        &self,
        id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Option<Station>, StoreError> {
        let row = tokio::time::timeout(
            self.write_timeout(),
            sqlx::query(
                "UPDATE stations SET name = COALESCE($2, name), \
                        description = COALESCE($3, description), updated_at = now() \
                 WHERE id = $1 AND completed_at IS NULL \
                 RETURNING id, name, description, owner_id, created_at, updated_at, completed_at",
            )
            .bind(id)
            .bind(name)
            .bind(description)
            .fetch_optional(self.pool()),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        row.as_ref().map(map_station).transpose()
    }

    /// Soft delete: the station disappears from every read path.
    pub async fn complete_station(&self, id: Uuid) -> Result<Option<Station>, StoreError> {
        let row = tokio::time::timeout(
            self.write_timeout(),
            sqlx::query(
                "UPDATE stations SET completed_at = now(), updated_at = now() \
                 WHERE id = $1 AND completed_at IS NULL \
                 RETURNING id, name, description, owner_id, created_at, updated_at, completed_at",
            )
            .bind(id)
            .fetch_optional(self.pool()),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        row.as_ref().map(map_station).transpose()
    }
}
