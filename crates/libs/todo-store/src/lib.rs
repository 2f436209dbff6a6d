//! Record types and store boundary for the todo sync stack.
//!
//! This crate defines the contract between a client-side cache and the
//! authoritative todo table. It provides:
//!
//! - **Record types** (`Todo`, `Priority`, request payloads, `StoreEvent`)
//! - **Async trait definitions** for the remote operations and push channel
//! - **`MemoryStore`**, an explicitly owned authoritative table
//! - **`FaultyStore`**, a wrapper that injects failures and latency
//! - **`StoreError`**, the error taxonomy surfaced to callers
//!
//! # Trait hierarchy
//!
//! - [`TodoStore`]: `list`, `create`, `update`, `toggle`, `delete`
//! - [`TodoEvents`]: push channel subscriptions via broadcast channels
//! - [`RemoteStore`]: composite (auto-implemented for both)

pub mod error;
pub mod traits;
pub mod types;

pub use error::StoreError;
pub use traits::{RemoteStore, TodoEvents, TodoStore};
pub use types::*;

mod faulty;
mod memory;
pub use faulty::{FaultyStore, StoreOp};
pub use memory::MemoryStore;
