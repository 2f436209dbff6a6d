use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::types::StoreEvent;

/// Change subscriptions via `tokio::sync::broadcast`.
#[async_trait]
pub trait TodoEvents: Send + Sync {
    /// Subscribe to change events for the todo table. Only events published
    /// after the call returns are delivered.
    async fn subscribe(&self) -> Result<broadcast::Receiver<StoreEvent>, StoreError>;
}
