//! Live count subscription and counter sync

use std::sync::Arc;
use std::time::Duration;

use pledgewall::counter::{spawn_counter_sync, CountSource, CounterBoard, CounterCell};
use pledgewall::db::schemas::PledgeDoc;
use pledgewall::fallback::LocalPledgeLog;
use pledgewall::store::{InMemoryPledgeStore, PledgeStore};
use tokio_test::{assert_pending, assert_ready_eq, task};

fn pledge(name: &str, is_public: bool) -> PledgeDoc {
    PledgeDoc {
        parent_name: name.to_string(),
        display_name: name.to_string(),
        is_public,
        ..Default::default()
    }
}

#[tokio::test]
async fn subscription_wakes_only_for_public_changes() {
    let store = InMemoryPledgeStore::new();
    let mut sub = store.subscribe_public_count();
    assert_eq!(sub.next().await, Some(0));

    {
        let mut next = task::spawn(sub.next());
        assert_pending!(next.poll());

        store.create(pledge("private", false)).await.unwrap();
        assert!(!next.is_woken());
        assert_pending!(next.poll());

        store.create(pledge("public", true)).await.unwrap();
        assert!(next.is_woken());
        assert_ready_eq!(next.poll(), Some(1));
    }

    sub.unsubscribe();
}

async fn wait_for(cell: &CounterCell, value: u64) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while cell.get() != Some(value) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("counter did not reach expected value");
}

#[tokio::test]
async fn sync_mirrors_remote_count_into_every_slot() {
    let dir = tempfile::tempdir().unwrap();
    let fallback = Arc::new(LocalPledgeLog::new(dir.path().join("pledges.json")));
    let store = Arc::new(InMemoryPledgeStore::new());
    for i in 0..3 {
        store.create(pledge(&format!("family {}", i), true)).await.unwrap();
    }

    let cell = Arc::new(CounterCell::new());
    let board = CounterBoard::bind_all(&cell);
    let sync = spawn_counter_sync(cell.clone(), store.clone(), fallback);

    wait_for(&cell, 3).await;
    assert!(board.consistent());

    store.create(pledge("late", true)).await.unwrap();
    wait_for(&cell, 4).await;
    assert!(board.consistent());
    assert_eq!(board.shown("nav-count"), Some(4));
    assert_ne!(cell.source(), Some(CountSource::LocalFallback));

    sync.abort();
}

#[tokio::test]
async fn late_bound_display_sees_current_value() {
    let cell = CounterCell::new();
    cell.set(12, CountSource::Fetch);

    let board = CounterBoard::bind_all(&cell);
    assert!(board.consistent());
    assert_eq!(board.shown("family-count"), Some(12));
}
