use orbitask_domain::BoardList;
use sqlx::Row;
use uuid::Uuid;

use crate::boards::ListWithTasks;
use crate::{Store, StoreError};

/// Sibling shift that keeps `{0..N-1}` dense when an item moves from `old` to
/// `target` within one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shift {
    None,
    /// Item moves later: positions in `(old, target]` decrement.
    Down { lo_excl: i32, hi_incl: i32 },
    /// Item moves earlier: positions in `[target, old)` increment.
    Up { lo_incl: i32, hi_excl: i32 },
}

pub(crate) fn plan_shift(old: i32, target: i32) -> Shift {
    if target == old {
        Shift::None
    } else if target > old {
        Shift::Down {
            lo_excl: old,
            hi_incl: target,
        }
    } else {
        Shift::Up {
            lo_incl: target,
            hi_excl: old,
        }
    }
}

/// Requested positions past the tail land on the last dense slot.
pub(crate) fn clamp_target(requested: i32, count: i64) -> i32 {
    let last = (count.max(1) - 1) as i32;
    requested.clamp(0, last)
}

pub(crate) fn map_list(row: &sqlx::postgres::PgRow) -> Result<BoardList, StoreError> {
    Ok(BoardList {
        id: row.try_get("id")?,
        board_id: row.try_get("board_id")?,
        name: row.try_get("name")?,
        position: row.try_get("position")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const LIST_COLUMNS: &str = "id, board_id, name, position, created_at, updated_at";

impl Store {
    /// Appends at `max + 1` (0 for an empty board). The board row is locked so
    /// concurrent appends cannot mint the same position.
    pub async fn create_list(&self, board_id: Uuid, name: &str) -> Result<BoardList, StoreError> {
        let row = tokio::time::timeout(self.write_timeout(), async {
            let mut tx = self.pool().begin().await?;

            sqlx::query("SELECT id FROM boards WHERE id = $1 FOR UPDATE")
                .bind(board_id)
                .fetch_one(&mut *tx)
                .await?;

            let next: i32 = sqlx::query(
                "SELECT COALESCE(MAX(position) + 1, 0) AS next FROM lists WHERE board_id = $1",
            )
            .bind(board_id)
            .fetch_one(&mut *tx)
            .await?
            .try_get("next")?;

            let row = sqlx::query(&format!(
                "INSERT INTO lists (id, board_id, name, position) VALUES ($1, $2, $3, $4) \
                 RETURNING {LIST_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(board_id)
            .bind(name)
            .bind(next)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>(row)
        })
        .await
        .map_err(|_| StoreError::Timeout)??;

        map_list(&row)
    }

    /// Lists in position order, each with its task cards in position order.
    pub async fn lists_for_board(&self, board_id: Uuid) -> Result<Vec<ListWithTasks>, StoreError> {
        let detail = self.board_detail(board_id).await?;
        Ok(detail.map(|d| d.lists).unwrap_or_default())
    }

    pub async fn find_list(&self, id: Uuid) -> Result<Option<BoardList>, StoreError> {
        let row = sqlx::query(&format!("SELECT {LIST_COLUMNS} FROM lists WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        row.as_ref().map(map_list).transpose()
    }

    pub async fn rename_list(&self, id: Uuid, name: &str) -> Result<Option<BoardList>, StoreError> {
        let row = tokio::time::timeout(
            self.write_timeout(),
            sqlx::query(&format!(
                "UPDATE lists SET name = $2, updated_at = now() WHERE id = $1 \
                 RETURNING {LIST_COLUMNS}"
            ))
            .bind(id)
            .bind(name)
            .fetch_optional(self.pool()),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        row.as_ref().map(map_list).transpose()
    }

    /// Moves a list to `requested` within its board, shifting the siblings in
    /// between by one. The board row is locked before anything else, so every
    /// concurrent reorder on the same board queues behind it instead of
    /// deadlocking on sibling rows or corrupting the dense ordering.
    pub async fn reorder_list(
        &self,
        id: Uuid,
        requested: i32,
    ) -> Result<BoardList, StoreError> {
        let row = tokio::time::timeout(self.write_timeout(), async {
            let mut tx = self.pool().begin().await?;

            let board = sqlx::query(
                "SELECT b.id AS board_id FROM boards b \
                 JOIN lists l ON l.board_id = b.id \
                 WHERE l.id = $1 FOR UPDATE OF b",
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
            let board_id: Uuid = board.try_get("board_id")?;

            let old: i32 = sqlx::query("SELECT position FROM lists WHERE id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?
                .try_get("position")?;

            let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM lists WHERE board_id = $1")
                .bind(board_id)
                .fetch_one(&mut *tx)
                .await?
                .try_get("n")?;
            let target = clamp_target(requested, count);

            match plan_shift(old, target) {
                Shift::None => {
                    // Already in the requested slot: no writes, current state back.
                    let row =
                        sqlx::query(&format!("SELECT {LIST_COLUMNS} FROM lists WHERE id = $1"))
                            .bind(id)
                            .fetch_one(&mut *tx)
                            .await?;
                    tx.commit().await?;
                    return Ok::<_, sqlx::Error>(row);
                }
                Shift::Down { lo_excl, hi_incl } => {
                    sqlx::query(
                        "UPDATE lists SET position = position - 1 \
                         WHERE board_id = $1 AND id <> $2 AND position > $3 AND position <= $4",
                    )
                    .bind(board_id)
                    .bind(id)
                    .bind(lo_excl)
                    .bind(hi_incl)
                    .execute(&mut *tx)
                    .await?;
                }
                Shift::Up { lo_incl, hi_excl } => {
                    sqlx::query(
                        "UPDATE lists SET position = position + 1 \
                         WHERE board_id = $1 AND id <> $2 AND position >= $3 AND position < $4",
                    )
                    .bind(board_id)
                    .bind(id)
                    .bind(lo_incl)
                    .bind(hi_excl)
                    .execute(&mut *tx)
                    .await?;
                }
            }

            // The moved row is written last.
            let row = sqlx::query(&format!(
                "UPDATE lists SET position = $2, updated_at = now() WHERE id = $1 \
                 RETURNING {LIST_COLUMNS}"
            ))
            .bind(id)
            .bind(target)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>(row)
        })
        .await
        .map_err(|_| StoreError::Timeout)??;

        map_list(&row)
    }

    /// Deletes the list (tasks cascade) and compacts the remaining siblings so
    /// the board stays dense.
    pub async fn delete_list(&self, id: Uuid) -> Result<bool, StoreError> {
        let deleted = tokio::time::timeout(self.write_timeout(), async {
            let mut tx = self.pool().begin().await?;

            // Same board-first lock order as the reorder path.
            let Some(board) = sqlx::query(
                "SELECT b.id AS board_id FROM boards b \
                 JOIN lists l ON l.board_id = b.id \
                 WHERE l.id = $1 FOR UPDATE OF b",
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            else {
                return Ok::<_, sqlx::Error>(false);
            };

            let board_id: Uuid = board.try_get("board_id")?;
            let old: i32 = sqlx::query("SELECT position FROM lists WHERE id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?
                .try_get("position")?;

            sqlx::query("DELETE FROM lists WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                "UPDATE lists SET position = position - 1 WHERE board_id = $1 AND position > $2",
            )
            .bind(board_id)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_position_is_a_no_op() {
        assert_eq!(plan_shift(3, 3), Shift::None);
        assert_eq!(plan_shift(0, 0), Shift::None);
    }

    #[test]
    fn moving_later_decrements_between_old_and_target() {
        assert_eq!(
            plan_shift(1, 4),
            Shift::Down {
                lo_excl: 1,
                hi_incl: 4
            }
        );
    }

    #[test]
    fn moving_earlier_increments_between_target_and_old() {
        assert_eq!(
            plan_shift(4, 1),
            Shift::Up {
                lo_incl: 1,
                hi_excl: 4
            }
        );
    }

    #[test]
    fn adjacent_swap_shifts_exactly_one_slot() {
        assert_eq!(
            plan_shift(2, 3),
            Shift::Down {
                lo_excl: 2,
                hi_incl: 3
            }
        );
        assert_eq!(
            plan_shift(3, 2),
            Shift::Up {
                lo_incl: 2,
                hi_excl: 3
            }
        );
    }

    #[test]
    fn target_is_clamped_to_the_dense_range() {
        assert_eq!(clamp_target(99, 4), 3);
        assert_eq!(clamp_target(-1, 4), 0);
        assert_eq!(clamp_target(2, 4), 2);
        assert_eq!(clamp_target(0, 0), 0);
    }

    /// Replays a shift plan against an in-memory container and checks the
    /// dense invariant the reindexer maintains in SQL.
    fn apply(positions: &mut Vec<i32>, moved: usize, target: i32) {
        let old = positions[moved];
        match plan_shift(old, target) {
            Shift::None => {}
            Shift::Down { lo_excl, hi_incl } => {
                for (i, p) in positions.iter_mut().enumerate() {
                    if i != moved && *p > lo_excl && *p <= hi_incl {
                        *p -= 1;
                    }
                }
            }
            Shift::Up { lo_incl, hi_excl } => {
                for (i, p) in positions.iter_mut().enumerate() {
                    if i != moved && *p >= lo_incl && *p < hi_excl {
                        *p += 1;
                    }
                }
            }
        }
        positions[moved] = target;
    }

    #[test]
    fn sequential_reorders_preserve_the_dense_invariant() {
        let mut positions: Vec<i32> = (0..6).collect();

        for (moved, target) in [(0, 5), (4, 0), (2, 2), (5, 1), (1, 3)] {
            apply(&mut positions, moved, target);
            let mut sorted = positions.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..6).collect::<Vec<_>>(), "after move to {target}");
        }
    }
}
