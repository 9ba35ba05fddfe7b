//! Tenant context snapshots handed to the inference pass-through. Everything
//! here is assembled from rows the caller is already authorized to see.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use orbitask_domain::{Station, TaskPriority, TaskStatus};
use orbitask_store::{Store, StoreError, TaskCard, TaskDetail};
use serde_json::{json, Value};
use uuid::Uuid;

/// The slice of a task that the metric math needs.
#[derive(Debug, Clone, Copy)]
pub struct TaskFacts {
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assigned: bool,
    pub due_date: Option<DateTime<Utc>>,
}

impl From<&TaskCard> for TaskFacts {
    fn from(card: &TaskCard) -> Self {
        Self {
            status: card.status,
            priority: card.priority,
            assigned: card.assigned_to.is_some(),
            due_date: card.due_date,
        }
    }
}

fn percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        0
    } else {
        ((part as f64) * 100.0 / (total as f64)).round() as u32
    }
}

fn count_by<K: Ord>(tasks: &[TaskFacts], f: impl Fn(&TaskFacts) -> K) -> BTreeMap<K, usize> {
    let mut counts = BTreeMap::new();
    for task in tasks {
        *counts.entry(f(task)).or_insert(0) += 1;
    }
    counts
}

fn overdue_count(tasks: &[TaskFacts], now: DateTime<Utc>) -> usize {
    tasks
        .iter()
        .filter(|t| {
            t.status != TaskStatus::Done && t.due_date.map(|due| due < now).unwrap_or(false)
        })
        .count()
}

pub fn station_metrics(tasks: &[TaskFacts], member_count: usize, now: DateTime<Utc>) -> Value {
    let total = tasks.len();
    let by_status: BTreeMap<&str, usize> = count_by(tasks, |t| t.status.as_str());
    let by_priority: BTreeMap<&str, usize> = count_by(tasks, |t| t.priority.as_str());
    let done = by_status.get(TaskStatus::Done.as_str()).copied().unwrap_or(0);
    let unassigned = tasks.iter().filter(|t| !t.assigned).count();

    json!({
        "total_tasks": total,
        "tasks_by_status": by_status,
        "tasks_by_priority": by_priority,
        "overdue_tasks": overdue_count(tasks, now),
        "unassigned_tasks": unassigned,
        "completion_rate": percent(done, total),
        "active_members": member_count,
        "avg_tasks_per_member": if member_count == 0 {
            0
        } else {
            ((total as f64) / (member_count as f64)).round() as u64
        },
    })
}

pub fn board_metrics(tasks: &[TaskFacts]) -> Value {
    let total = tasks.len();
    let by_status: BTreeMap<&str, usize> = count_by(tasks, |t| t.status.as_str());
    let done = by_status.get(TaskStatus::Done.as_str()).copied().unwrap_or(0);

    json!({
        "total_tasks": total,
        "tasks_by_status": by_status,
        "completion_rate": percent(done, total),
    })
}

/// Full station snapshot: members, boards, every task card, and the computed
/// metrics. Boards are capped at ten per station so this stays a handful of
/// queries.
pub async fn station_context(
    store: &Store,
    station: &Station,
    user_id: Uuid,
) -> Result<Value, StoreError> {
    let members = store.members_of(station.id).await?;
    let boards = store.boards_for_station(station.id).await?;

    let mut facts = Vec::new();
    let mut task_rows = Vec::new();
    for board in &boards {
        let Some(detail) = store.board_detail(board.board.id).await? else {
            continue;
        };
        for list in &detail.lists {
            for card in &list.tasks {
                facts.push(TaskFacts::from(card));
                task_rows.push(json!({
                    "id": card.id,
                    "title": card.title,
                    "status": card.status,
                    "priority": card.priority,
                    "assigned_to": card.assigned_name.as_deref().unwrap_or("Não atribuída"),
                    "due_date": card.due_date,
                    "board_name": board.board.name,
                    "list_name": list.name,
                }));
            }
        }
    }

    Ok(json!({
        "station": {
            "id": station.id,
            "name": station.name,
            "description": station.description,
            "created_at": station.created_at,
            "member_count": members.len(),
        },
        "members": members.iter().map(|m| json!({
            "id": m.user.id,
            "name": m.user.full_name,
            "email": m.user.email,
            "role": m.role,
            "joined_at": m.joined_at,
        })).collect::<Vec<_>>(),
        "boards": boards.iter().map(|b| json!({
            "id": b.board.id,
            "name": b.board.name,
            "description": b.board.description,
            "created_at": b.board.created_at,
            "lists_count": b.lists.len(),
        })).collect::<Vec<_>>(),
        "tasks": task_rows,
        "metrics": station_metrics(&facts, members.len(), Utc::now()),
        "context_generated_at": Utc::now(),
        "requesting_user_id": user_id,
    }))
}

pub async fn board_context(
    store: &Store,
    board_id: Uuid,
    station_name: &str,
    user_id: Uuid,
) -> Result<Option<Value>, StoreError> {
    let Some(detail) = store.board_detail(board_id).await? else {
        return Ok(None);
    };

    let facts: Vec<TaskFacts> = detail
        .lists
        .iter()
        .flat_map(|l| l.tasks.iter().map(TaskFacts::from))
        .collect();

    Ok(Some(json!({
        "board": {
            "id": detail.board.id,
            "name": detail.board.name,
            "description": detail.board.description,
            "station_name": station_name,
            "created_at": detail.board.created_at,
        },
        "lists": detail.lists.iter().map(|l| json!({
            "id": l.id,
            "name": l.name,
            "tasks_count": l.tasks.len(),
        })).collect::<Vec<_>>(),
        "tasks": detail.lists.iter().flat_map(|l| l.tasks.iter().map(|t| json!({
            "id": t.id,
            "title": t.title,
            "status": t.status,
            "priority": t.priority,
            "assigned_to": t.assigned_name.as_deref().unwrap_or("Não atribuída"),
            "due_date": t.due_date,
            "list_name": l.name,
        }))).collect::<Vec<_>>(),
        "metrics": board_metrics(&facts),
        "context_generated_at": Utc::now(),
        "requesting_user_id": user_id,
    })))
}

pub async fn task_context(
    store: &Store,
    task: &TaskDetail,
    station_name: &str,
    user_id: Uuid,
) -> Result<Value, StoreError> {
    let comments = store.comments_for_task(task.task.id).await?;

    Ok(json!({
        "task": {
            "id": task.task.id,
            "title": task.task.title,
            "description": task.task.description,
            "status": task.task.status,
            "priority": task.task.priority,
            "assigned_to": task.assigned_name.as_deref().unwrap_or("Não atribuída"),
            "created_by": task.created_by_name,
            "created_at": task.task.created_at,
            "updated_at": task.task.updated_at,
            "due_date": task.task.due_date,
            "list_name": task.list_name,
            "board_name": task.board_name,
            "station_name": station_name,
        },
        "comments": comments.iter().map(|c| json!({
            "id": c.comment.id,
            "content": c.comment.content,
            "author": c.user.full_name,
            "created_at": c.comment.created_at,
        })).collect::<Vec<_>>(),
        "context_generated_at": Utc::now(),
        "requesting_user_id": user_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn facts(
        status: TaskStatus,
        assigned: bool,
        due_offset_hours: Option<i64>,
        now: DateTime<Utc>,
    ) -> TaskFacts {
        TaskFacts {
            status,
            priority: TaskPriority::Medium,
            assigned,
            due_date: due_offset_hours.map(|h| now + Duration::hours(h)),
        }
    }

    #[test]
    fn empty_station_has_zeroed_metrics() {
        let metrics = station_metrics(&[], 3, Utc::now());
        assert_eq!(metrics["total_tasks"], 0);
        assert_eq!(metrics["completion_rate"], 0);
        assert_eq!(metrics["avg_tasks_per_member"], 0);
        assert_eq!(metrics["active_members"], 3);
    }

    #[test]
    fn completion_rate_rounds_to_whole_percent() {
        let now = Utc::now();
        let tasks = vec![
            facts(TaskStatus::Done, true, None, now),
            facts(TaskStatus::Todo, true, None, now),
            facts(TaskStatus::InProgress, true, None, now),
        ];
        // 1 of 3 done -> 33%
        assert_eq!(station_metrics(&tasks, 1, now)["completion_rate"], 33);
    }

    #[test]
    fn overdue_excludes_done_and_future_tasks() {
        let now = Utc::now();
        let tasks = vec![
            facts(TaskStatus::Todo, true, Some(-2), now),
            facts(TaskStatus::Done, true, Some(-2), now),
            facts(TaskStatus::Todo, true, Some(2), now),
            facts(TaskStatus::Todo, true, None, now),
        ];
        assert_eq!(station_metrics(&tasks, 1, now)["overdue_tasks"], 1);
    }

    #[test]
    fn unassigned_and_grouping_are_counted() {
        let now = Utc::now();
        let tasks = vec![
            facts(TaskStatus::Todo, false, None, now),
            facts(TaskStatus::Todo, true, None, now),
            facts(TaskStatus::Review, false, None, now),
        ];
        let metrics = station_metrics(&tasks, 2, now);
        assert_eq!(metrics["unassigned_tasks"], 2);
        assert_eq!(metrics["tasks_by_status"]["todo"], 2);
        assert_eq!(metrics["tasks_by_status"]["review"], 1);
        assert_eq!(metrics["avg_tasks_per_member"], 2); // 3/2 rounds up
    }

    #[test]
    fn board_metrics_only_reports_status_and_rate() {
        let now = Utc::now();
        let tasks = vec![
            facts(TaskStatus::Done, true, None, now),
            facts(TaskStatus::Done, true, None, now),
        ];
        let metrics = board_metrics(&tasks);
        assert_eq!(metrics["completion_rate"], 100);
        assert!(metrics.get("overdue_tasks").is_none());
    }
}
