use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use todo_store::*;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::codec::{read_frame, write_frame};
use crate::protocol::{methods, RpcRequest, RpcResponse, ServerFrame};

/// Connection state shared with the reader task.
///
/// `events` is `None` once the connection is gone, which closes every local
/// subscriber.
struct Shared {
    waiters: HashMap<u64, oneshot::Sender<RpcResponse>>,
    events: Option<broadcast::Sender<StoreEvent>>,
}

impl Shared {
    fn closed(&self) -> bool {
        self.events.is_none()
    }
}

type SharedState = Arc<Mutex<Shared>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// How long a request may wait for its response.
    pub request_timeout: Duration,
    /// Buffer of the local event fan-out.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            event_capacity: 256,
        }
    }
}

/// A [`RemoteStore`] reached over one TCP connection.
///
/// A background task reads every server frame, completing waiting requests
/// by id and fanning events out to local subscribers. When the connection
/// drops, outstanding and future requests fail with `Transport` and local
/// event receivers see the channel close.
pub struct RpcClient {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    shared: SharedState,
    next_id: AtomicU64,
    subscribed: AtomicBool,
    request_timeout: Duration,
    reader: JoinHandle<()>,
}

impl RpcClient {
    pub async fn connect<A: ToSocketAddrs>(addr: A, config: ClientConfig) -> Result<Self, StoreError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let shared: SharedState = Arc::new(Mutex::new(Shared {
            waiters: HashMap::new(),
            events: Some(events),
        }));
        let reader = tokio::spawn(read_loop(reader, shared.clone()));
        Ok(Self {
            writer: tokio::sync::Mutex::new(writer),
            shared,
            next_id: AtomicU64::new(1),
            subscribed: AtomicBool::new(false),
            request_timeout: config.request_timeout,
            reader,
        })
    }

    async fn call<P, R>(&self, method: &str, params: Option<P>) -> Result<R, StoreError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let params = params
            .map(serde_json::to_value)
            .transpose()
            .map_err(|err| StoreError::internal(format!("encode {method} params: {err}")))?;
        let request = RpcRequest {
            id,
            method: method.to_string(),
            params,
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut shared = self.lock()?;
            if shared.closed() {
                return Err(StoreError::transport("connection closed"));
            }
            shared.waiters.insert(id, tx);
        }
        let written = {
            let mut writer = self.writer.lock().await;
            write_frame(&mut *writer, &request).await
        };
        if let Err(err) = written {
            self.forget(id);
            return Err(err.into());
        }

        let response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(StoreError::transport("connection closed")),
            Err(_) => {
                self.forget(id);
                return Err(StoreError::Timeout {
                    operation: method.to_string(),
                });
            }
        };
        if let Some(error) = response.error {
            return Err(error.into());
        }
        serde_json::from_value(response.result.unwrap_or(JsonValue::Null))
            .map_err(|err| StoreError::transport(format!("malformed {method} response: {err}")))
    }

    fn forget(&self, id: u64) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.waiters.remove(&id);
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Shared>, StoreError> {
        self.shared
            .lock()
            .map_err(|_| StoreError::internal("rpc client state poisoned"))
    }

    /// Requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared
            .lock()
            .map(|shared| shared.waiters.len())
            .unwrap_or(0)
    }

    /// Whether the reader has seen the connection end.
    pub fn is_closed(&self) -> bool {
        self.shared
            .lock()
            .map(|shared| shared.closed())
            .unwrap_or(true)
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(mut reader: OwnedReadHalf, shared: SharedState) {
    loop {
        match read_frame::<_, ServerFrame>(&mut reader).await {
            Ok(Some(ServerFrame::Response(response))) => {
                let waiter = shared
                    .lock()
                    .ok()
                    .and_then(|mut shared| shared.waiters.remove(&response.id));
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(response);
                    }
                    None => log::debug!("dropping response to unknown request {}", response.id),
                }
            }
            Ok(Some(ServerFrame::Event(event))) => {
                if let Ok(shared) = shared.lock() {
                    if let Some(events) = &shared.events {
                        let _ = events.send(event);
                    }
                }
            }
            Ok(None) => {
                log::debug!("rpc server closed the connection");
                break;
            }
            Err(err) => {
                log::warn!("rpc read failed: {err}");
                break;
            }
        }
    }
    // Dropping the senders fails every waiting request and ends every
    // event subscription.
    if let Ok(mut shared) = shared.lock() {
        shared.events = None;
        shared.waiters.clear();
    }
}

#[async_trait]
impl TodoStore for RpcClient {
    async fn list(&self) -> Result<Vec<Todo>, StoreError> {
        self.call(methods::LIST, None::<()>).await
    }

    async fn create(&self, request: CreateTodo) -> Result<Todo, StoreError> {
        self.call(methods::CREATE, Some(request)).await
    }

    async fn update(&self, request: UpdateTodo) -> Result<Todo, StoreError> {
        self.call(methods::UPDATE, Some(request)).await
    }

    async fn toggle(&self, id: TodoId) -> Result<Todo, StoreError> {
        self.call(methods::TOGGLE, Some(TodoRef { id })).await
    }

    async fn delete(&self, id: TodoId) -> Result<DeleteAck, StoreError> {
        self.call(methods::DELETE, Some(TodoRef { id })).await
    }
}

#[async_trait]
impl TodoEvents for RpcClient {
    async fn subscribe(&self) -> Result<broadcast::Receiver<StoreEvent>, StoreError> {
        // Subscribe locally first so nothing pushed after the server acks is missed.
        let receiver = {
            let shared = self.lock()?;
            match &shared.events {
                Some(events) => events.subscribe(),
                None => return Err(StoreError::transport("connection closed")),
            }
        };
        if !self.subscribed.swap(true, Ordering::AcqRel) {
            if let Err(err) = self.call::<(), bool>(methods::SUBSCRIBE, None).await {
                self.subscribed.store(false, Ordering::Release);
                return Err(err);
            }
        }
        Ok(receiver)
    }
}
