use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::traits::*;
use crate::types::*;

/// The authoritative todo table, held in memory.
///
/// Owned by whoever serves it: created at startup, dropped at shutdown.
/// Every successful write publishes a [`StoreEvent`] to subscribers.
pub struct MemoryStore {
    table: Mutex<Table>,
    events: broadcast::Sender<StoreEvent>,
}

struct Table {
    rows: Vec<Todo>,
    last_id: i64,
}

impl Table {
    /// Ids follow wall-clock milliseconds but never repeat or go backwards.
    fn assign_id(&mut self, now: OffsetDateTime) -> TodoId {
        let millis = (now.unix_timestamp_nanos() / 1_000_000) as i64;
        self.last_id = millis.max(self.last_id + 1).max(1);
        TodoId::new(self.last_id)
    }

    fn insert(&mut self, request: CreateTodo, now: OffsetDateTime) -> Todo {
        let todo = Todo {
            id: self.assign_id(now),
            title: request.title,
            completed: false,
            priority: request.priority,
            created_at: now,
            updated_at: None,
        };
        self.rows.push(todo.clone());
        todo
    }

    fn find_mut(&mut self, id: TodoId) -> Result<&mut Todo, StoreError> {
        self.rows
            .iter_mut()
            .find(|todo| todo.id == id)
            .ok_or_else(|| StoreError::todo_not_found(id))
    }
}

impl MemoryStore {
    pub const DEFAULT_EVENT_CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::with_event_capacity(Self::DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            table: Mutex::new(Table {
                rows: Vec::new(),
                last_id: 0,
            }),
            events,
        }
    }

    /// Insert initial rows without publishing events.
    pub fn seed<I>(&self, rows: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = CreateTodo>,
    {
        let mut table = self.lock()?;
        let mut inserted = 0;
        for request in rows {
            request.validate()?;
            table.insert(request, OffsetDateTime::now_utc());
            inserted += 1;
        }
        Ok(inserted)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|table| table.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live receivers of the event channel.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Table>, StoreError> {
        self.table
            .lock()
            .map_err(|_| StoreError::internal("todo table lock poisoned"))
    }

    fn publish(&self, event: StoreEvent) {
        let kind = event.kind();
        // No subscribers is not an error.
        if let Ok(receivers) = self.events.send(event) {
            log::debug!("published {kind} event to {receivers} subscriber(s)");
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TodoStore for MemoryStore {
    async fn list(&self) -> Result<Vec<Todo>, StoreError> {
        Ok(self.lock()?.rows.clone())
    }

    async fn create(&self, request: CreateTodo) -> Result<Todo, StoreError> {
        request.validate()?;
        let todo = self.lock()?.insert(request, OffsetDateTime::now_utc());
        self.publish(StoreEvent::Insert(todo.clone()));
        Ok(todo)
    }

    async fn update(&self, request: UpdateTodo) -> Result<Todo, StoreError> {
        request.validate()?;
        let todo = {
            let mut table = self.lock()?;
            let todo = table.find_mut(request.id)?;
            todo.title = request.title;
            todo.priority = request.priority;
            todo.touch(OffsetDateTime::now_utc());
            todo.clone()
        };
        self.publish(StoreEvent::Update(todo.clone()));
        Ok(todo)
    }

    async fn toggle(&self, id: TodoId) -> Result<Todo, StoreError> {
        let todo = {
            let mut table = self.lock()?;
            let todo = table.find_mut(id)?;
            todo.completed = !todo.completed;
            todo.touch(OffsetDateTime::now_utc());
            todo.clone()
        };
        self.publish(StoreEvent::Update(todo.clone()));
        Ok(todo)
    }

    async fn delete(&self, id: TodoId) -> Result<DeleteAck, StoreError> {
        {
            let mut table = self.lock()?;
            let index = table
                .rows
                .iter()
                .position(|todo| todo.id == id)
                .ok_or_else(|| StoreError::todo_not_found(id))?;
            table.rows.remove(index);
        }
        self.publish(StoreEvent::Delete { id });
        Ok(DeleteAck { success: true })
    }
}

#[async_trait]
impl TodoEvents for MemoryStore {
    async fn subscribe(&self) -> Result<broadcast::Receiver<StoreEvent>, StoreError> {
        Ok(self.events.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_assigns_increasing_positive_ids() {
        let store = MemoryStore::new();
        let a = store.create(CreateTodo::new("a", Priority::High)).await.expect("a");
        let b = store.create(CreateTodo::new("b", Priority::Low)).await.expect("b");

        assert!(a.id.get() > 0);
        assert!(b.id > a.id);
        assert!(!a.completed);
        assert_eq!(a.updated_at, None);
        assert_eq!(store.list().await.expect("list"), vec![a, b]);
    }

    #[tokio::test]
    async fn blank_title_is_rejected_without_insert() {
        let store = MemoryStore::new();
        let err = store
            .create(CreateTodo::new("  ", Priority::Medium))
            .await
            .expect_err("blank");
        assert!(matches!(err, StoreError::Validation { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn update_and_toggle_stamp_updated_at() {
        let store = MemoryStore::new();
        let todo = store.create(CreateTodo::new("draft", Priority::Medium)).await.expect("create");

        let updated = store
            .update(UpdateTodo {
                id: todo.id,
                title: "final".into(),
                priority: Priority::High,
            })
            .await
            .expect("update");
        assert_eq!(updated.title, "final");
        assert_eq!(updated.priority, Priority::High);
        assert!(updated.updated_at.expect("stamped") >= updated.created_at);

        let toggled = store.toggle(todo.id).await.expect("toggle");
        assert!(toggled.completed);
        let toggled = store.toggle(todo.id).await.expect("toggle back");
        assert!(!toggled.completed);
    }

    #[tokio::test]
    async fn missing_ids_report_not_found() {
        let store = MemoryStore::new();
        let missing = TodoId::new(99);

        assert_eq!(
            store.toggle(missing).await.expect_err("toggle"),
            StoreError::todo_not_found(missing)
        );
        assert!(matches!(
            store.delete(missing).await.expect_err("delete"),
            StoreError::NotFound { .. }
        ));
        let err = store
            .update(UpdateTodo {
                id: missing,
                title: "x".into(),
                priority: Priority::Low,
            })
            .await
            .expect_err("update");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_preserves_order_of_remaining_rows() {
        let store = MemoryStore::new();
        store
            .seed(["one", "two", "three"].map(|t| CreateTodo::new(t, Priority::Medium)))
            .expect("seed");
        let rows = store.list().await.expect("list");

        let ack = store.delete(rows[1].id).await.expect("delete");
        assert!(ack.success);

        let titles: Vec<_> = store
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, ["one", "three"]);
    }

    #[tokio::test]
    async fn writes_publish_events_but_seeding_does_not() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe().await.expect("subscribe");
        store.seed([CreateTodo::new("seeded", Priority::High)]).expect("seed");

        let created = store.create(CreateTodo::new("live", Priority::Low)).await.expect("create");
        store.toggle(created.id).await.expect("toggle");
        store.delete(created.id).await.expect("delete");

        assert_eq!(rx.recv().await.expect("insert"), StoreEvent::Insert(created.clone()));
        assert!(matches!(rx.recv().await.expect("update"), StoreEvent::Update(t) if t.completed));
        assert_eq!(rx.recv().await.expect("delete"), StoreEvent::Delete { id: created.id });
        assert!(rx.try_recv().is_err());
    }
}
