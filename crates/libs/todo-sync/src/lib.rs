//! Client-side mirror of a remote todo table.
//!
//! - [`Cache`]: ordered, id-keyed records behind an atomic snapshot swap
//! - [`MutationController`]: optimistic create/update/toggle/delete with
//!   snapshot rollback on failure
//! - [`RealtimeMerge`]: idempotent append of store-pushed inserts
//! - [`view`]: filter, search and edit-mode state for presenting the cache
//!
//! All cache writes, whether from mutations or from the push channel, go
//! through [`Cache::set`] so there is one mutation path.

pub mod cache;
pub mod controller;
pub mod realtime;
pub mod view;

pub use cache::{Cache, Records, Snapshot};
pub use controller::{MutationController, RefreshOutcome};
pub use realtime::{MergeOutcome, MergeStats, RealtimeMerge};
pub use view::{EditDraft, EditSession, Filter, ListView};
