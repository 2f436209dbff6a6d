//! Ordered, id-keyed mirror of the remote todo list.
//!
//! The cache holds an `Arc<Records>` behind a `watch` channel. Readers get a
//! cheap immutable snapshot; writers go through [`Cache::set`], which swaps
//! the whole value in one step and wakes every subscriber. Snapshots handed
//! out earlier are never mutated: writes clone-on-write when a snapshot is
//! still shared.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use todo_store::{Todo, TodoId};
use tokio::sync::watch;

/// Immutable view of the cache at one point in time.
pub type Snapshot = Arc<Records>;

/// Insertion-ordered records keyed by id.
#[derive(Clone, Debug, Default)]
pub struct Records {
    map: IndexMap<TodoId, Todo>,
}

impl Records {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, id: TodoId) -> Option<&Todo> {
        self.map.get(&id)
    }

    pub fn contains(&self, id: TodoId) -> bool {
        self.map.contains_key(&id)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Todo> + '_ {
        self.map.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = TodoId> + '_ {
        self.map.keys().copied()
    }

    /// Append unless the id is already present. Returns whether it was added.
    pub fn push(&mut self, todo: Todo) -> bool {
        if self.map.contains_key(&todo.id) {
            return false;
        }
        self.map.insert(todo.id, todo);
        true
    }

    /// Remove by id, keeping the order of the remaining records.
    pub fn remove(&mut self, id: TodoId) -> Option<Todo> {
        self.map.shift_remove(&id)
    }

    /// Edit the record in place. Returns `false` if the id is absent.
    pub fn update<F>(&mut self, id: TodoId, edit: F) -> bool
    where
        F: FnOnce(&mut Todo),
    {
        match self.map.get_mut(&id) {
            Some(todo) => {
                edit(todo);
                true
            }
            None => false,
        }
    }

    /// Put `todo` where the record `id` sits, re-keying if the ids differ.
    ///
    /// If `todo.id` is already present elsewhere, that record wins and the
    /// record at `id` is dropped instead, so ids stay unique. Returns `false`
    /// if `id` was absent.
    pub fn replace(&mut self, id: TodoId, todo: Todo) -> bool {
        let Some(index) = self.map.get_index_of(&id) else {
            return false;
        };
        if todo.id == id {
            self.map.insert(id, todo);
            return true;
        }
        self.map.shift_remove_index(index);
        if !self.map.contains_key(&todo.id) {
            self.map.shift_insert(index, todo.id, todo);
        }
        true
    }
}

/// Order-sensitive: two record sets are equal only if ids, fields and
/// positions all match.
impl PartialEq for Records {
    fn eq(&self, other: &Self) -> bool {
        self.map.len() == other.map.len() && self.map.iter().eq(other.map.iter())
    }
}

impl Eq for Records {}

impl FromIterator<Todo> for Records {
    /// Later duplicates of an id replace the earlier value in its position.
    fn from_iter<I: IntoIterator<Item = Todo>>(iter: I) -> Self {
        let mut map = IndexMap::new();
        for todo in iter {
            map.insert(todo.id, todo);
        }
        Self { map }
    }
}

impl<'a> IntoIterator for &'a Records {
    type Item = &'a Todo;
    type IntoIter = indexmap::map::Values<'a, TodoId, Todo>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.values()
    }
}

/// Shared cache of todo records.
pub struct Cache {
    tx: watch::Sender<Snapshot>,
    version: AtomicU64,
}

impl Cache {
    pub fn new() -> Self {
        Self::with_records(Records::new())
    }

    pub fn with_records(records: Records) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(records));
        Self {
            tx,
            version: AtomicU64::new(0),
        }
    }

    /// Current snapshot.
    pub fn get(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    /// Apply `transform` to the records and publish the result as one step.
    /// Always notifies subscribers.
    pub fn set<F>(&self, transform: F)
    where
        F: FnOnce(&mut Records),
    {
        self.tx.send_modify(|current| transform(Arc::make_mut(current)));
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Like [`Cache::set`], but subscribers are only woken (and the version
    /// only bumped) when `transform` reports a change.
    pub fn set_if<F>(&self, transform: F) -> bool
    where
        F: FnOnce(&mut Records) -> bool,
    {
        let changed = self
            .tx
            .send_if_modified(|current| transform(Arc::make_mut(current)));
        if changed {
            self.version.fetch_add(1, Ordering::AcqRel);
        }
        changed
    }

    /// Put back a snapshot taken earlier, exactly as it was.
    pub fn restore(&self, snapshot: Snapshot) {
        self.tx.send_replace(snapshot);
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Replace every record with `records`, in the given order.
    pub fn replace_all<I>(&self, records: I)
    where
        I: IntoIterator<Item = Todo>,
    {
        self.restore(Arc::new(records.into_iter().collect()));
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    /// Number of writes published so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    pub fn contains(&self, id: TodoId) -> bool {
        self.tx.borrow().contains(id)
    }

    pub fn find(&self, id: TodoId) -> Option<Todo> {
        self.tx.borrow().get(id).cloned()
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}
