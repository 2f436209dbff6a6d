mod support;

use std::sync::Arc;

use support::{setup, todo, CannedStore, GatedStore};
use todo_store::*;
use todo_sync::*;

type Store = GatedStore<FaultyStore<MemoryStore>>;

struct Harness {
    store: Arc<Store>,
    cache: Arc<Cache>,
    edit: Arc<EditSession>,
    controller: MutationController,
}

impl Harness {
    async fn seeded(titles: &[(&str, Priority)]) -> Self {
        setup();
        let memory = MemoryStore::new();
        memory
            .seed(titles.iter().map(|(title, priority)| CreateTodo::new(*title, *priority)))
            .expect("seed");
        let harness = Self::over(Records::new(), memory);
        assert_eq!(
            harness.controller.refresh().await.expect("initial load"),
            RefreshOutcome::Applied(titles.len())
        );
        harness
    }

    fn over(records: Records, memory: MemoryStore) -> Self {
        let store = Arc::new(GatedStore::new(FaultyStore::new(memory)));
        let cache = Arc::new(Cache::with_records(records));
        let edit = Arc::new(EditSession::new());
        let controller = MutationController::new(store.clone(), cache.clone())
            .with_edit_session(edit.clone());
        Self {
            store,
            cache,
            edit,
            controller,
        }
    }

    fn faults(&self) -> &FaultyStore<MemoryStore> {
        self.store.inner()
    }

    fn id_at(&self, index: usize) -> TodoId {
        self.cache.get().ids().nth(index).expect("record at index")
    }
}

#[tokio::test]
async fn failed_delete_restores_exact_cache() {
    setup();
    let original: Records = [todo(1, "Learn X", false, Priority::High)].into_iter().collect();
    let harness = Harness::over(original.clone(), MemoryStore::new());
    harness
        .faults()
        .fail_next(StoreOp::Delete, StoreError::transport("connection reset"));

    let err = harness
        .controller
        .delete(TodoId::new(1))
        .await
        .expect_err("transport failure surfaces");

    assert_eq!(err, StoreError::transport("connection reset"));
    assert_eq!(*harness.cache.get(), original);
}

#[tokio::test]
async fn create_settles_to_the_stored_id() {
    setup();
    let stored = todo(42, "Buy milk", false, Priority::Low);
    let cache = Arc::new(Cache::with_records(
        [todo(1, "Learn X", false, Priority::High)].into_iter().collect(),
    ));
    let controller = MutationController::new(
        Arc::new(CannedStore {
            created: stored.clone(),
        }),
        cache.clone(),
    );

    let created = controller.create("Buy milk", Priority::Low).await.expect("create");

    assert_eq!(created, stored);
    let records = cache.get();
    assert_eq!(records.len(), 2);
    assert_eq!(records.get(TodoId::new(42)), Some(&stored));
    assert!(records.ids().all(|id| !id.is_temporary()));
}

#[tokio::test]
async fn create_is_visible_before_the_store_answers() {
    let harness = Harness::seeded(&[]).await;
    let gate = harness.store.hold(StoreOp::Create);

    let create = harness.controller.create("Walk dog", Priority::High);
    let observe = async {
        gate.entered().await;
        let records = harness.cache.get();
        let placeholder = records.iter().next().expect("optimistic record").clone();
        gate.release();
        placeholder
    };
    let (created, placeholder) = tokio::join!(create, observe);
    let created = created.expect("create");

    assert!(placeholder.id.is_temporary());
    assert_eq!(placeholder.title, "Walk dog");
    assert!(!placeholder.completed);
    assert_eq!(placeholder.priority, Priority::High);

    let ids: Vec<_> = harness.cache.get().ids().collect();
    assert_eq!(ids, [created.id]);
}

#[tokio::test]
async fn blank_title_never_reaches_store_or_cache() {
    let harness = Harness::seeded(&[("existing", Priority::Medium)]).await;
    let before = harness.cache.get();
    let version = harness.cache.version();

    for title in ["", "   ", "\t"] {
        let err = harness
            .controller
            .create(title, Priority::Medium)
            .await
            .expect_err("blank title");
        assert!(matches!(err, StoreError::Validation { .. }));
    }
    let err = harness
        .controller
        .update(harness.id_at(0), " ", Priority::Low)
        .await
        .expect_err("blank update");
    assert!(matches!(err, StoreError::Validation { .. }));

    assert_eq!(harness.faults().calls(StoreOp::Create), 0);
    assert_eq!(harness.faults().calls(StoreOp::Update), 0);
    assert_eq!(harness.cache.version(), version);
    assert!(Arc::ptr_eq(&harness.cache.get(), &before));
}

#[tokio::test]
async fn toggle_twice_returns_to_original() {
    let harness = Harness::seeded(&[("flip me", Priority::Medium)]).await;
    let id = harness.id_at(0);

    let once = harness.controller.toggle(id).await.expect("toggle");
    assert!(once.completed);
    assert_eq!(harness.cache.find(id).map(|t| t.completed), Some(true));

    let twice = harness.controller.toggle(id).await.expect("toggle back");
    assert!(!twice.completed);
    assert_eq!(harness.cache.find(id), Some(twice));
}

#[tokio::test]
async fn every_failed_mutation_rolls_back() {
    let harness = Harness::seeded(&[
        ("one", Priority::High),
        ("two", Priority::Medium),
        ("three", Priority::Low),
    ])
    .await;
    let id = harness.id_at(1);
    let before = harness.cache.get();

    for op in [StoreOp::Create, StoreOp::Update, StoreOp::Toggle, StoreOp::Delete] {
        harness.faults().fail_next(op, StoreError::transport("offline"));
        let result = match op {
            StoreOp::Create => harness.controller.create("four", Priority::Low).await.map(drop),
            StoreOp::Update => harness.controller.update(id, "renamed", Priority::Low).await.map(drop),
            StoreOp::Toggle => harness.controller.toggle(id).await.map(drop),
            StoreOp::Delete => harness.controller.delete(id).await,
            StoreOp::List => unreachable!(),
        };
        let err = result.expect_err("injected failure");
        assert!(err.is_retryable(), "{op}: {err}");
        assert_eq!(*harness.cache.get(), *before, "{op} left the cache changed");
    }
    assert_eq!(harness.store.inner().inner().len(), 3);
}

#[tokio::test]
async fn update_of_missing_record_reports_not_found() {
    let harness = Harness::seeded(&[("keep", Priority::Medium)]).await;
    let ghost = todo(7, "ghost", false, Priority::Low);
    harness.cache.set(|records| {
        records.push(ghost.clone());
    });
    harness.edit.begin(&ghost);
    let before = harness.cache.get();

    let err = harness
        .controller
        .update(ghost.id, "still a ghost", Priority::High)
        .await
        .expect_err("store has no such id");

    assert_eq!(err, StoreError::todo_not_found(ghost.id));
    assert_eq!(*harness.cache.get(), *before);
    assert_eq!(harness.edit.editing(), Some(ghost.id));
}

#[tokio::test]
async fn successful_update_merges_record_and_closes_edit_mode() {
    let harness = Harness::seeded(&[("draft", Priority::Medium)]).await;
    let id = harness.id_at(0);
    let current = harness.cache.find(id).expect("cached");
    harness.edit.begin(&current);

    let updated = harness
        .controller
        .update(id, "final", Priority::High)
        .await
        .expect("update");

    assert_eq!(updated.title, "final");
    assert_eq!(updated.priority, Priority::High);
    assert!(updated.updated_at.expect("stamped") >= updated.created_at);
    assert_eq!(harness.cache.find(id), Some(updated));
    assert_eq!(harness.edit.editing(), None);
}

#[tokio::test]
async fn delete_removes_record_for_good() {
    let harness = Harness::seeded(&[("a", Priority::Low), ("b", Priority::Low)]).await;
    let id = harness.id_at(0);

    harness.controller.delete(id).await.expect("delete");

    assert!(!harness.cache.contains(id));
    assert_eq!(harness.cache.len(), 1);
    harness.controller.refresh().await.expect("refresh");
    assert!(!harness.cache.contains(id));
}

#[tokio::test]
async fn refresh_landing_after_a_mutation_is_discarded() {
    let harness = Harness::seeded(&[("stale", Priority::Medium)]).await;
    let id = harness.id_at(0);
    let gate = harness.store.hold(StoreOp::List);

    let refresh = harness.controller.refresh();
    let mutate = async {
        gate.entered().await;
        let toggled = harness.controller.toggle(id).await.expect("toggle");
        gate.release();
        toggled
    };
    let (outcome, toggled) = tokio::join!(refresh, mutate);

    assert_eq!(outcome.expect("list"), RefreshOutcome::Discarded);
    assert_eq!(harness.cache.find(id), Some(toggled));
}

#[tokio::test]
async fn realtime_insert_before_settlement_is_not_duplicated() {
    setup();
    let stored = todo(42, "Buy milk", false, Priority::Low);
    let store = Arc::new(GatedStore::new(CannedStore {
        created: stored.clone(),
    }));
    let cache = Arc::new(Cache::new());
    let controller = MutationController::new(store.clone(), cache.clone());
    let merge = RealtimeMerge::new(cache.clone());
    let gate = store.hold(StoreOp::Create);

    let create = controller.create("Buy milk", Priority::Low);
    let push = async {
        gate.entered().await;
        let outcome = merge.apply(&StoreEvent::Insert(stored.clone()));
        gate.release();
        outcome
    };
    let (created, pushed) = tokio::join!(create, push);
    created.expect("create");

    assert_eq!(pushed, MergeOutcome::Appended);
    let ids: Vec<_> = cache.get().ids().collect();
    assert_eq!(ids, [TodoId::new(42)]);
    assert_eq!(merge.apply(&StoreEvent::Insert(stored)), MergeOutcome::Duplicate);
}

#[tokio::test]
async fn overlapping_mutations_roll_back_to_intermediate_state() {
    let harness = Harness::seeded(&[("original", Priority::Medium)]).await;
    let id = harness.id_at(0);
    let update_gate = harness.store.hold(StoreOp::Update);
    let toggle_gate = harness.store.hold(StoreOp::Toggle);
    harness
        .faults()
        .fail_next(StoreOp::Toggle, StoreError::transport("dropped"));

    let update = harness.controller.update(id, "renamed", Priority::High);
    let toggle = async {
        update_gate.entered().await;
        let result = harness.controller.toggle(id);
        let settle = async {
            toggle_gate.entered().await;
            toggle_gate.release();
        };
        let (result, ()) = tokio::join!(result, settle);
        // The toggle's snapshot held the update's optimistic state.
        let intermediate = harness.cache.find(id).expect("cached");
        update_gate.release();
        (result, intermediate)
    };
    let (updated, (toggled, intermediate)) = tokio::join!(update, toggle);

    assert!(toggled.is_err());
    assert_eq!(intermediate.title, "renamed");
    assert!(!intermediate.completed);

    let updated = updated.expect("update");
    assert_eq!(harness.cache.find(id), Some(updated));
}
