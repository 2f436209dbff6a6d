use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::traits::*;
use crate::types::*;

/// The request/response operations of [`TodoStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    List,
    Create,
    Update,
    Toggle,
    Delete,
}

impl StoreOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Toggle => "toggle",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreOp {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "list" => Ok(Self::List),
            "create" | "add" => Ok(Self::Create),
            "update" | "edit" => Ok(Self::Update),
            "toggle" => Ok(Self::Toggle),
            "delete" | "rm" => Ok(Self::Delete),
            other => Err(StoreError::validation(format!("unknown operation: {other:?}"))),
        }
    }
}

#[derive(Default)]
struct FaultPlan {
    failures: HashMap<StoreOp, VecDeque<StoreError>>,
    calls: HashMap<StoreOp, usize>,
    latency: Option<Duration>,
}

/// Wraps a store and injects scripted failures and latency.
///
/// Queued failures are consumed one per call of the matching operation; a
/// failing call never reaches the inner store. Events pass through untouched.
pub struct FaultyStore<S> {
    inner: S,
    plan: Mutex<FaultPlan>,
}

impl<S> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            plan: Mutex::new(FaultPlan::default()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Queue `error` for the next call of `op`.
    pub fn fail_next(&self, op: StoreOp, error: StoreError) {
        if let Ok(mut plan) = self.plan.lock() {
            plan.failures.entry(op).or_default().push_back(error);
        }
    }

    /// Delay applied before every operation, failing or not.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut plan) = self.plan.lock() {
            plan.latency = latency;
        }
    }

    /// Number of calls made for `op`, including injected failures.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.plan
            .lock()
            .map(|plan| plan.calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    async fn gate(&self, op: StoreOp) -> Result<(), StoreError> {
        let (latency, failure) = {
            let mut plan = self
                .plan
                .lock()
                .map_err(|_| StoreError::internal("fault plan lock poisoned"))?;
            *plan.calls.entry(op).or_default() += 1;
            let failure = plan.failures.get_mut(&op).and_then(VecDeque::pop_front);
            (plan.latency, failure)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(err) => {
                log::debug!("injecting failure into {op}: {err}");
                Err(err)
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<S: TodoStore> TodoStore for FaultyStore<S> {
    async fn list(&self) -> Result<Vec<Todo>, StoreError> {
        self.gate(StoreOp::List).await?;
        self.inner.list().await
    }

    async fn create(&self, request: CreateTodo) -> Result<Todo, StoreError> {
        self.gate(StoreOp::Create).await?;
        self.inner.create(request).await
    }

    async fn update(&self, request: UpdateTodo) -> Result<Todo, StoreError> {
        self.gate(StoreOp::Update).await?;
        self.inner.update(request).await
    }

    async fn toggle(&self, id: TodoId) -> Result<Todo, StoreError> {
        self.gate(StoreOp::Toggle).await?;
        self.inner.toggle(id).await
    }

    async fn delete(&self, id: TodoId) -> Result<DeleteAck, StoreError> {
        self.gate(StoreOp::Delete).await?;
        self.inner.delete(id).await
    }
}

#[async_trait]
impl<S: TodoEvents> TodoEvents for FaultyStore<S> {
    async fn subscribe(&self) -> Result<broadcast::Receiver<StoreEvent>, StoreError> {
        self.inner.subscribe().await
    }
}
