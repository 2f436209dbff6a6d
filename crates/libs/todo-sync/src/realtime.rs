use std::sync::Arc;

use todo_store::{StoreError, StoreEvent, TodoEvents};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::cache::Cache;

/// What applying one push event did to the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    Appended,
    /// The id was already cached, by an earlier delivery or by a local create.
    Duplicate,
    /// Not an insert.
    Ignored,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub appended: u64,
    pub duplicates: u64,
    pub ignored: u64,
    pub lagged: u64,
}

/// Appends store-pushed inserts to the cache, once per id.
#[derive(Clone)]
pub struct RealtimeMerge {
    cache: Arc<Cache>,
}

impl RealtimeMerge {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }

    pub fn apply(&self, event: &StoreEvent) -> MergeOutcome {
        let StoreEvent::Insert(todo) = event else {
            return MergeOutcome::Ignored;
        };
        if self.cache.set_if(|records| records.push(todo.clone())) {
            log::debug!("realtime insert appended {}", todo.id);
            MergeOutcome::Appended
        } else {
            MergeOutcome::Duplicate
        }
    }

    /// Apply events in delivery order until the channel closes.
    pub async fn run(self, mut events: broadcast::Receiver<StoreEvent>) -> MergeStats {
        let mut stats = MergeStats::default();
        loop {
            match events.recv().await {
                Ok(event) => match self.apply(&event) {
                    MergeOutcome::Appended => stats.appended += 1,
                    MergeOutcome::Duplicate => stats.duplicates += 1,
                    MergeOutcome::Ignored => stats.ignored += 1,
                },
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("realtime merge lagged, {skipped} event(s) dropped");
                    stats.lagged += skipped;
                }
                Err(RecvError::Closed) => break,
            }
        }
        log::debug!("realtime merge stopped: {stats:?}");
        stats
    }

    /// Subscribe to `source` and run the merge on a background task.
    pub async fn spawn<E>(self, source: &E) -> Result<JoinHandle<MergeStats>, StoreError>
    where
        E: TodoEvents + ?Sized,
    {
        let events = source.subscribe().await?;
        Ok(tokio::spawn(self.run(events)))
    }
}
