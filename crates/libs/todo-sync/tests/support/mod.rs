#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use time::macros::datetime;
use todo_store::*;
use tokio::sync::{broadcast, Semaphore};

static INIT: Once = Once::new();

pub fn setup() {
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
            .is_test(true)
            .try_init();
    });
}

pub fn todo(id: i64, title: &str, completed: bool, priority: Priority) -> Todo {
    Todo {
        id: TodoId::new(id),
        title: title.into(),
        completed,
        priority,
        created_at: datetime!(2024-05-01 9:00 UTC),
        updated_at: None,
    }
}

/// Holds calls of one operation until the test lets them through.
#[derive(Clone)]
pub struct Gate {
    entered: Arc<Semaphore>,
    release: Arc<Semaphore>,
}

impl Gate {
    fn new() -> Self {
        Self {
            entered: Arc::new(Semaphore::new(0)),
            release: Arc::new(Semaphore::new(0)),
        }
    }

    /// Wait until a held call has reached the store.
    pub async fn entered(&self) {
        self.entered.acquire().await.expect("gate open").forget();
    }

    /// Let one held call proceed.
    pub fn release(&self) {
        self.release.add_permits(1);
    }

    async fn pass(&self) -> Result<(), StoreError> {
        self.entered.add_permits(1);
        self.release
            .acquire()
            .await
            .map_err(|_| StoreError::internal("gate closed"))?
            .forget();
        Ok(())
    }
}

/// Store wrapper whose operations can be paused per [`StoreOp`].
pub struct GatedStore<S> {
    inner: S,
    gates: Mutex<HashMap<StoreOp, Gate>>,
}

impl<S> GatedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// From now on, every call of `op` waits for [`Gate::release`].
    pub fn hold(&self, op: StoreOp) -> Gate {
        self.gates
            .lock()
            .expect("gates")
            .entry(op)
            .or_insert_with(Gate::new)
            .clone()
    }

    async fn pass(&self, op: StoreOp) -> Result<(), StoreError> {
        let gate = self.gates.lock().expect("gates").get(&op).cloned();
        match gate {
            Some(gate) => gate.pass().await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<S: TodoStore> TodoStore for GatedStore<S> {
    async fn list(&self) -> Result<Vec<Todo>, StoreError> {
        self.pass(StoreOp::List).await?;
        self.inner.list().await
    }

    async fn create(&self, request: CreateTodo) -> Result<Todo, StoreError> {
        self.pass(StoreOp::Create).await?;
        self.inner.create(request).await
    }

    async fn update(&self, request: UpdateTodo) -> Result<Todo, StoreError> {
        self.pass(StoreOp::Update).await?;
        self.inner.update(request).await
    }

    async fn toggle(&self, id: TodoId) -> Result<Todo, StoreError> {
        self.pass(StoreOp::Toggle).await?;
        self.inner.toggle(id).await
    }

    async fn delete(&self, id: TodoId) -> Result<DeleteAck, StoreError> {
        self.pass(StoreOp::Delete).await?;
        self.inner.delete(id).await
    }
}

#[async_trait]
impl<S: TodoEvents> TodoEvents for GatedStore<S> {
    async fn subscribe(&self) -> Result<broadcast::Receiver<StoreEvent>, StoreError> {
        self.inner.subscribe().await
    }
}

/// Answers `create` with a fixed record; everything else is unscripted.
pub struct CannedStore {
    pub created: Todo,
}

#[async_trait]
impl TodoStore for CannedStore {
    async fn list(&self) -> Result<Vec<Todo>, StoreError> {
        Err(StoreError::internal("unscripted list"))
    }

    async fn create(&self, _request: CreateTodo) -> Result<Todo, StoreError> {
        Ok(self.created.clone())
    }

    async fn update(&self, _request: UpdateTodo) -> Result<Todo, StoreError> {
        Err(StoreError::internal("unscripted update"))
    }

    async fn toggle(&self, _id: TodoId) -> Result<Todo, StoreError> {
        Err(StoreError::internal("unscripted toggle"))
    }

    async fn delete(&self, _id: TodoId) -> Result<DeleteAck, StoreError> {
        Err(StoreError::internal("unscripted delete"))
    }
}
