//! Optimistic mutations with snapshot rollback.
//!
//! Every write runs the same three steps:
//!
//! 1. mark in-flight list reads stale so they cannot land over the
//!    optimistic state;
//! 2. snapshot the cache and install the intended state before the store is
//!    called;
//! 3. on success merge the store's record, on failure restore the snapshot.
//!
//! Mutations on the same id are not serialized. A second mutation issued
//! before the first settles snapshots the first one's optimistic state, and
//! rolling it back restores that intermediate state. The last settlement to
//! land wins.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use time::OffsetDateTime;
use todo_store::{CreateTodo, Priority, StoreError, StoreOp, Todo, TodoId, TodoStore, UpdateTodo};

use crate::cache::{Cache, Snapshot};
use crate::view::EditSession;

/// Result of [`MutationController::refresh`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cache now holds this many records from the store.
    Applied(usize),
    /// A mutation started while the read was in flight; the result was dropped.
    Discarded,
}

/// Cache state captured before an optimistic apply.
struct PendingMutation {
    op: StoreOp,
    snapshot: Snapshot,
}

impl PendingMutation {
    fn rollback(self, cache: &Cache, err: StoreError) -> StoreError {
        log::warn!("{} failed, rolling back cache: {err}", self.op);
        cache.restore(self.snapshot);
        err
    }
}

pub struct MutationController {
    store: Arc<dyn TodoStore>,
    cache: Arc<Cache>,
    edit: Option<Arc<EditSession>>,
    read_generation: AtomicU64,
    last_temp_id: AtomicI64,
}

impl MutationController {
    pub fn new(store: Arc<dyn TodoStore>, cache: Arc<Cache>) -> Self {
        Self {
            store,
            cache,
            edit: None,
            read_generation: AtomicU64::new(0),
            last_temp_id: AtomicI64::new(0),
        }
    }

    /// Close this edit session when an update of the edited id succeeds.
    pub fn with_edit_session(mut self, edit: Arc<EditSession>) -> Self {
        self.edit = Some(edit);
        self
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Reload the cache from the store.
    ///
    /// If any mutation begins while the list call is outstanding, the
    /// response is discarded rather than overwriting optimistic state.
    pub async fn refresh(&self) -> Result<RefreshOutcome, StoreError> {
        let generation = self.read_generation.load(Ordering::Acquire);
        let todos = self.store.list().await?;
        if self.read_generation.load(Ordering::Acquire) != generation {
            log::debug!("discarding stale list of {} records", todos.len());
            return Ok(RefreshOutcome::Discarded);
        }
        let count = todos.len();
        self.cache.replace_all(todos);
        Ok(RefreshOutcome::Applied(count))
    }

    /// Optimistically append a record, then swap in the stored one.
    ///
    /// A blank title fails with `Validation` before the cache or the store is
    /// touched.
    pub async fn create(
        &self,
        title: impl Into<String>,
        priority: Priority,
    ) -> Result<Todo, StoreError> {
        let request = CreateTodo::new(title, priority);
        request.validate()?;

        let pending = self.begin(StoreOp::Create);
        let temp_id = self.next_temp_id();
        let placeholder = Todo {
            id: temp_id,
            title: request.title.clone(),
            completed: false,
            priority: request.priority,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
        };
        self.cache.set(|records| {
            records.push(placeholder);
        });
        log::debug!("create applied under temporary id {temp_id}");

        match self.store.create(request).await {
            Ok(todo) => {
                let stored = todo.clone();
                self.cache.set(|records| {
                    // The placeholder is gone if another mutation rolled back
                    // past it; the stored record still belongs in the cache.
                    if !records.replace(temp_id, stored.clone()) {
                        records.push(stored);
                    }
                });
                log::debug!("create settled: {temp_id} -> {}", todo.id);
                Ok(todo)
            }
            Err(err) => Err(pending.rollback(&self.cache, err)),
        }
    }

    pub async fn update(
        &self,
        id: TodoId,
        title: impl Into<String>,
        priority: Priority,
    ) -> Result<Todo, StoreError> {
        let request = UpdateTodo {
            id,
            title: title.into(),
            priority,
        };
        request.validate()?;

        let pending = self.begin(StoreOp::Update);
        let now = OffsetDateTime::now_utc();
        self.cache.set(|records| {
            records.update(id, |todo| {
                todo.title = request.title.clone();
                todo.priority = request.priority;
                todo.touch(now);
            });
        });

        match self.store.update(request).await {
            Ok(todo) => {
                self.settle_replace(id, &todo);
                if let Some(edit) = &self.edit {
                    edit.close(id);
                }
                Ok(todo)
            }
            Err(err) => Err(pending.rollback(&self.cache, err)),
        }
    }

    pub async fn toggle(&self, id: TodoId) -> Result<Todo, StoreError> {
        let pending = self.begin(StoreOp::Toggle);
        self.cache.set(|records| {
            records.update(id, |todo| todo.completed = !todo.completed);
        });

        match self.store.toggle(id).await {
            Ok(todo) => {
                self.settle_replace(id, &todo);
                Ok(todo)
            }
            Err(err) => Err(pending.rollback(&self.cache, err)),
        }
    }

    pub async fn delete(&self, id: TodoId) -> Result<(), StoreError> {
        let pending = self.begin(StoreOp::Delete);
        self.cache.set(|records| {
            records.remove(id);
        });

        match self.store.delete(id).await {
            Ok(_) => Ok(()),
            Err(err) => Err(pending.rollback(&self.cache, err)),
        }
    }

    /// Suppress in-flight reads and capture the pre-apply snapshot. Must run
    /// immediately before the optimistic apply.
    fn begin(&self, op: StoreOp) -> PendingMutation {
        self.read_generation.fetch_add(1, Ordering::AcqRel);
        PendingMutation {
            op,
            snapshot: self.cache.get(),
        }
    }

    fn next_temp_id(&self) -> TodoId {
        TodoId::new(self.last_temp_id.fetch_sub(1, Ordering::AcqRel) - 1)
    }

    /// Overwrite the optimistic record with the stored one, if still present.
    fn settle_replace(&self, id: TodoId, todo: &Todo) {
        self.cache.set(|records| {
            records.replace(id, todo.clone());
        });
    }
}
