use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::*;

/// Typed operations against the authoritative todo table.
#[async_trait]
pub trait TodoStore: Send + Sync {
    /// All records, in insertion order.
    async fn list(&self) -> Result<Vec<Todo>, StoreError>;

    /// Create a record. The store assigns the id and timestamps.
    async fn create(&self, request: CreateTodo) -> Result<Todo, StoreError>;

    /// Replace title and priority of an existing record.
    async fn update(&self, request: UpdateTodo) -> Result<Todo, StoreError>;

    /// Flip `completed` on an existing record.
    async fn toggle(&self, id: TodoId) -> Result<Todo, StoreError>;

    async fn delete(&self, id: TodoId) -> Result<DeleteAck, StoreError>;
}
