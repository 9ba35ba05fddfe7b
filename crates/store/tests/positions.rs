use std::time::Duration;

use orbitask_domain::templates::BoardTemplate;
use orbitask_store::Store;

fn test_db_url() -> Option<String> {
    std::env::var("ORBITASK_TEST_DB_URL")
        .ok()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn schema_db_url(base: &str, schema: &str) -> String {
    let separator = if base.contains('?') { "&" } else { "?" };
    format!("{base}{separator}options=-csearch_path%3D{schema}")
}

async fn fresh_store() -> Option<Store> {
    let db_url = test_db_url()?;
    let schema = format!("orbitask_test_{}", ulid::Ulid::new().to_string().to_lowercase());

    let admin = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(&db_url)
        .await
        .expect("DB connect should succeed");
    sqlx::query(&format!("CREATE SCHEMA {schema}"))
        .execute(&admin)
        .await
        .expect("create schema should succeed");
    admin.close().await;

    let store = Store::connect_and_migrate(
        &schema_db_url(&db_url, &schema),
        Duration::from_secs(5),
    )
    .await
    .expect("store connect + migrate should succeed");
    Some(store)
}

async fn list_positions(store: &Store, board_id: uuid::Uuid) -> Vec<(String, i32)> {
    store
        .lists_for_board(board_id)
        .await
        .expect("lists should load")
        .into_iter()
        .map(|l| (l.name, l.position))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn list_reorder_keeps_positions_dense() {
    let Some(store) = fresh_store().await else {
        eprintln!("skipping DB position test; set ORBITASK_TEST_DB_URL to enable");
        return;
    };

    let owner = store
        .create_user("owner@example.com", "hash", "Owner")
        .await
        .expect("user should insert");
    let station = store
        .create_station("Atlas", None, owner.id)
        .await
        .expect("station should insert");
    let (board, lists) = store
        .create_board(station.id, owner.id, "Sprint 1", None, None, BoardTemplate::Kanban)
        .await
        .expect("board should insert");

    assert_eq!(lists.len(), 4);
    assert_eq!(
        lists.iter().map(|l| l.position).collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );

    // Move the first list to the tail.
    let moved = store
        .reorder_list(lists[0].id, 3)
        .await
        .expect("reorder should succeed");
    assert_eq!(moved.position, 3);

    let after = list_positions(&store, board.id).await;
    assert_eq!(
        after.iter().map(|(_, p)| *p).collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );
    assert_eq!(after[3].0, lists[0].name);

    // An out-of-range target clamps to the last dense slot.
    let clamped = store
        .reorder_list(lists[1].id, 99)
        .await
        .expect("reorder should clamp");
    assert_eq!(clamped.position, 3);

    // Deleting from the middle compacts the survivors.
    assert!(store
        .delete_list(lists[2].id)
        .await
        .expect("delete should succeed"));
    let compacted = list_positions(&store, board.id).await;
    assert_eq!(
        compacted.iter().map(|(_, p)| *p).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );

    store.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposing_concurrent_reorders_both_succeed() {
    let Some(store) = fresh_store().await else {
        eprintln!("skipping DB position test; set ORBITASK_TEST_DB_URL to enable");
        return;
    };

    let owner = store
        .create_user("racer@example.com", "hash", "Racer")
        .await
        .expect("user should insert");
    let station = store
        .create_station("Relay", None, owner.id)
        .await
        .expect("station should insert");
    let (board, lists) = store
        .create_board(station.id, owner.id, "Swarm", None, None, BoardTemplate::Kanban)
        .await
        .expect("board should insert");

    // Head-to-tail and tail-to-head at once: the shift ranges cover each
    // other's moved rows, so without the board lock the two transactions
    // acquire row locks in opposite orders and one gets aborted.
    let first = lists[0].id;
    let last = lists[3].id;
    let s1 = store.clone();
    let s2 = store.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { s1.reorder_list(first, 3).await }),
        tokio::spawn(async move { s2.reorder_list(last, 0).await }),
    );
    a.expect("task should join").expect("first reorder should succeed");
    b.expect("task should join").expect("second reorder should succeed");

    let after = list_positions(&store, board.id).await;
    let mut positions: Vec<i32> = after.iter().map(|(_, p)| *p).collect();
    positions.sort_unstable();
    assert_eq!(positions, vec![0, 1, 2, 3]);

    store.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn same_slot_reorder_leaves_the_row_untouched() {
    let Some(store) = fresh_store().await else {
        eprintln!("skipping DB position test; set ORBITASK_TEST_DB_URL to enable");
        return;
    };

    let owner = store
        .create_user("idle@example.com", "hash", "Idle")
        .await
        .expect("user should insert");
    let station = store
        .create_station("Steady", None, owner.id)
        .await
        .expect("station should insert");
    let (_, lists) = store
        .create_board(station.id, owner.id, "Calm", None, None, BoardTemplate::Kanban)
        .await
        .expect("board should insert");

    let settled = store
        .reorder_list(lists[2].id, 2)
        .await
        .expect("reorder should succeed");
    assert_eq!(settled.position, 2);
    assert!(settled.updated_at.is_none(), "no-op reorder must not write");

    let task = store
        .create_task(
            lists[0].id,
            owner.id,
            orbitask_store::NewTask {
                title: "hold".to_string(),
                ..Default::default()
            },
        )
        .await
        .expect("task should insert");
    let settled = store
        .move_task(task.id, lists[0].id, Some(0))
        .await
        .expect("move should succeed");
    assert_eq!(settled.position, 0);
    assert!(settled.updated_at.is_none(), "no-op move must not write");

    store.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cross_list_move_compacts_both_lists() {
    let Some(store) = fresh_store().await else {
        eprintln!("skipping DB position test; set ORBITASK_TEST_DB_URL to enable");
        return;
    };

    let owner = store
        .create_user("mover@example.com", "hash", "Mover")
        .await
        .expect("user should insert");
    let station = store
        .create_station("Beacon", None, owner.id)
        .await
        .expect("station should insert");
    let (_, lists) = store
        .create_board(station.id, owner.id, "Flow", None, None, BoardTemplate::Kanban)
        .await
        .expect("board should insert");

    let origin = lists[0].id;
    let dest = lists[1].id;

    let mut origin_tasks = Vec::new();
    for title in ["a", "b", "c"] {
        let task = store
            .create_task(
                origin,
                owner.id,
                orbitask_store::NewTask {
                    title: title.to_string(),
                    ..Default::default()
                },
            )
            .await
            .expect("task should insert");
        origin_tasks.push(task);
    }
    assert_eq!(
        origin_tasks.iter().map(|t| t.position).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );

    let seeded = store
        .create_task(
            dest,
            owner.id,
            orbitask_store::NewTask {
                title: "x".to_string(),
                ..Default::default()
            },
        )
        .await
        .expect("task should insert");
    assert_eq!(seeded.position, 0);

    // Move the middle origin task to the head of the destination.
    let moved = store
        .move_task(origin_tasks[1].id, dest, Some(0))
        .await
        .expect("move should succeed");
    assert_eq!(moved.list_id, dest);
    assert_eq!(moved.position, 0);

    // Origin compacts to {0, 1}; destination shifts its seed to 1.
    let a = store
        .find_task(origin_tasks[0].id)
        .await
        .expect("lookup should succeed")
        .expect("task should exist");
    let c = store
        .find_task(origin_tasks[2].id)
        .await
        .expect("lookup should succeed")
        .expect("task should exist");
    assert_eq!(a.task.position, 0);
    assert_eq!(c.task.position, 1);

    let x = store
        .find_task(seeded.id)
        .await
        .expect("lookup should succeed")
        .expect("task should exist");
    assert_eq!(x.task.position, 1);

    // Omitted position appends at the destination tail.
    let appended = store
        .move_task(origin_tasks[0].id, dest, None)
        .await
        .expect("append move should succeed");
    assert_eq!(appended.position, 2);

    // Deleting from the middle compacts the destination.
    assert!(store
        .delete_task(x.task.id)
        .await
        .expect("delete should succeed"));
    let tail = store
        .find_task(appended.id)
        .await
        .expect("lookup should succeed")
        .expect("task should exist");
    assert_eq!(tail.task.position, 1);

    store.close().await;
}
